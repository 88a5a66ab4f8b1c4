//! MAC primitives, selected by the algorithm name negotiated in KEXINIT.

use digest::OutputSizeUser;
use hmac::Mac as _;
use sha1::Sha1;
use sha2::Sha256;
use strum::{AsRefStr, EnumString};

/// A negotiated MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Default)]
#[strum(serialize_all = "kebab-case")]
pub enum MacAlg {
    #[default]
    None,
    HmacSha1,
    #[strum(serialize = "hmac-sha2-256")]
    HmacSha256,
}

impl MacAlg {
    pub fn key_size(self) -> usize {
        self.size()
    }

    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::HmacSha1 => Sha1::output_size(),
            Self::HmacSha256 => <hmac::Hmac<Sha256> as OutputSizeUser>::output_size(),
        }
    }

    /// Computes the MAC over `seq_number || data`.
    pub fn sign(self, key: &[u8], seq: u32, data: &[u8]) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::HmacSha1 => sign::<hmac::Hmac<Sha1>>(key, seq, data),
            Self::HmacSha256 => sign::<hmac::Hmac<Sha256>>(key, seq, data),
        }
    }

    /// Verifies a MAC in constant time; never short-circuits on the first mismatching byte.
    pub fn verify(self, key: &[u8], seq: u32, data: &[u8], tag: &[u8]) -> bool {
        match self {
            Self::None => tag.is_empty(),
            Self::HmacSha1 => verify::<hmac::Hmac<Sha1>>(key, seq, data, tag),
            Self::HmacSha256 => verify::<hmac::Hmac<Sha256>>(key, seq, data, tag),
        }
    }
}

fn sign<M: hmac::Mac + hmac::digest::KeyInit>(key: &[u8], seq: u32, data: &[u8]) -> Vec<u8> {
    let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key).expect("key derivation yields a valid-length key");
    mac.update(&seq.to_be_bytes());
    mac.update(data);

    mac.finalize().into_bytes().to_vec()
}

fn verify<M: hmac::Mac + hmac::digest::KeyInit>(key: &[u8], seq: u32, data: &[u8], tag: &[u8]) -> bool {
    let mut mac = match <M as hmac::digest::KeyInit>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(&seq.to_be_bytes());
    mac.update(data);

    mac.verify_slice(tag).is_ok()
}
