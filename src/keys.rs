//! Per-direction key material, and the six-way key derivation from the shared secret.

use digest::{Digest, FixedOutputReset};
use num_bigint::BigUint;
use securefmt::Debug as SecureDebug;
use sha2::Sha256;

use crate::{cipher::CipherAlg, error::Result, mac::MacAlg, wire};

/// The symmetric state for a single direction (inbound or outbound) of a session.
///
/// The plaintext sentinel (`Keys::plaintext()`) means "no encryption, no MAC" and is what
/// every direction starts as before its first `NEWKEYS`.
#[derive(SecureDebug, Clone)]
pub struct Keys {
    pub cipher: CipherAlg,
    #[sensitive]
    pub cipher_key: Vec<u8>,
    #[sensitive]
    pub iv: Vec<u8>,
    pub mac: MacAlg,
    #[sensitive]
    pub mac_key: Vec<u8>,

    /// Packet sequence number for this direction; wraps modulo 2^32 and persists across rekeys.
    pub seq: u32,

    /// Cumulative keystream byte offset, for seekable (CTR) ciphers.
    pub(crate) stream_offset: u64,
    /// Running chaining IV (last ciphertext block), for CBC ciphers.
    #[sensitive]
    pub(crate) chain_iv: Vec<u8>,
}

impl Keys {
    /// The "no encryption, no MAC" key set used before the first `NEWKEYS` in each direction.
    pub fn plaintext() -> Self {
        Self {
            cipher: CipherAlg::None,
            cipher_key: Vec::new(),
            iv: Vec::new(),
            mac: MacAlg::None,
            mac_key: Vec::new(),
            seq: 0,
            stream_offset: 0,
            chain_iv: Vec::new(),
        }
    }

    pub fn is_plaintext(&self) -> bool {
        self.cipher.is_none()
    }

    pub fn block_size(&self) -> usize {
        self.cipher.block_size().max(8)
    }

    pub fn mac_size(&self) -> usize {
        self.mac.size()
    }

    pub fn advance_seq(&mut self) {
        self.seq = self.seq.wrapping_add(1);
    }

    /// Builds a fresh `Keys`, adopting `seq` from `previous` (invariant: sequence numbers
    /// persist across rekeys even though the cipher/MAC material is brand new).
    pub fn adopting_sequence(mut self, previous: &Keys) -> Self {
        self.seq = previous.seq;
        self
    }
}

/// The two key sets produced by a single key exchange, one per direction.
pub struct KeyPair {
    pub client_to_server: Keys,
    pub server_to_client: Keys,
}

/// Derives both directions' key material from `(shared secret, exchange hash, session id)`,
/// per RFC 4253 §7.2, using the single-character tags `A..F`.
pub fn derive(
    secret: &BigUint,
    hash: &[u8],
    session_id: &[u8],
    client_to_server_cipher: CipherAlg,
    client_to_server_mac: MacAlg,
    server_to_client_cipher: CipherAlg,
    server_to_client_mac: MacAlg,
) -> KeyPair {
    let mut secret_encoded = Vec::new();
    wire::put_mpint(&mut secret_encoded, secret);

    let client_to_server = Keys {
        iv: expand::<Sha256>(&secret_encoded, hash, b'A', session_id, client_to_server_cipher.iv_size()),
        cipher_key: expand::<Sha256>(&secret_encoded, hash, b'C', session_id, client_to_server_cipher.key_size()),
        mac_key: expand::<Sha256>(&secret_encoded, hash, b'E', session_id, client_to_server_mac.key_size()),
        cipher: client_to_server_cipher,
        mac: client_to_server_mac,
        seq: 0,
        stream_offset: 0,
        chain_iv: Vec::new(),
    };

    let server_to_client = Keys {
        iv: expand::<Sha256>(&secret_encoded, hash, b'B', session_id, server_to_client_cipher.iv_size()),
        cipher_key: expand::<Sha256>(&secret_encoded, hash, b'D', session_id, server_to_client_cipher.key_size()),
        mac_key: expand::<Sha256>(&secret_encoded, hash, b'F', session_id, server_to_client_mac.key_size()),
        cipher: server_to_client_cipher,
        mac: server_to_client_mac,
        seq: 0,
        stream_offset: 0,
        chain_iv: Vec::new(),
    };

    KeyPair {
        client_to_server,
        server_to_client,
    }
}

fn expand<D: Digest + FixedOutputReset>(
    secret: &[u8],
    hash: &[u8],
    tag: u8,
    session_id: &[u8],
    size: usize,
) -> Vec<u8> {
    if size == 0 {
        return Vec::new();
    }

    let mut hasher = D::new()
        .chain_update(secret)
        .chain_update(hash)
        .chain_update([tag])
        .chain_update(session_id);

    let mut key = hasher.finalize_reset().to_vec();

    while key.len() < size {
        hasher = hasher.chain_update(secret).chain_update(hash).chain_update(&key);
        key.extend_from_slice(&hasher.finalize_reset());
    }

    key.resize(size, 0);

    key
}

/// Decrypts or encrypts a full record in place, advancing `keys`' chaining state exactly once.
pub fn transform(keys: &mut Keys, record: &mut [u8], encrypt: bool) -> Result<()> {
    let mut chain_iv = keys.chain_iv.clone();

    keys.cipher.apply(
        &keys.cipher_key,
        &keys.iv,
        &mut keys.stream_offset,
        &mut chain_iv,
        record,
        encrypt,
    )?;

    keys.chain_iv = chain_iv;

    Ok(())
}

/// Peeks the decryption of the record's leading block, without mutating `keys`.
pub fn peek_block(keys: &Keys, block: &[u8]) -> Result<Vec<u8>> {
    keys.cipher
        .peek_block(&keys.cipher_key, &keys.iv, keys.stream_offset, &keys.chain_iv, block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_has_no_mac_or_cipher() {
        let keys = Keys::plaintext();

        assert!(keys.is_plaintext());
        assert_eq!(keys.mac_size(), 0);
        assert_eq!(keys.block_size(), 8);
    }

    #[test]
    fn derivation_is_deterministic_and_direction_distinct() {
        let secret = BigUint::from(12345u32);
        let hash = [1u8; 32];
        let session_id = [2u8; 32];

        let a = derive(
            &secret,
            &hash,
            &session_id,
            CipherAlg::Aes128Ctr,
            MacAlg::HmacSha256,
            CipherAlg::Aes128Ctr,
            MacAlg::HmacSha256,
        );
        let b = derive(
            &secret,
            &hash,
            &session_id,
            CipherAlg::Aes128Ctr,
            MacAlg::HmacSha256,
            CipherAlg::Aes128Ctr,
            MacAlg::HmacSha256,
        );

        assert_eq!(a.client_to_server.cipher_key, b.client_to_server.cipher_key);
        assert_ne!(a.client_to_server.cipher_key, a.server_to_client.cipher_key);
    }

    #[test]
    fn sequence_persists_across_rekey() {
        let mut old = Keys::plaintext();
        old.seq = 42;

        let fresh = Keys::plaintext().adopting_sequence(&old);
        assert_eq!(fresh.seq, 42);
    }
}
