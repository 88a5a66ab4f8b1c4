//! Symmetric cipher primitives, selected by the algorithm name negotiated in KEXINIT.
//!
//! Both CTR and CBC are implemented directly against the block ciphers from the `aes`
//! crate rather than through the higher-level `ctr`/`cbc` crates, so that each direction's
//! chaining state (a byte offset for CTR, the last ciphertext block for CBC) can be carried
//! as plain data in [`crate::keys::Keys`] between calls, matching the pure `(state, input)`
//! shape the transport core requires.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use strum::{AsRefStr, EnumString};

use crate::error::{Error, Result};

const BLOCK: usize = 16;

/// A negotiated symmetric cipher algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Default)]
#[strum(serialize_all = "kebab-case")]
pub enum CipherAlg {
    #[default]
    None,
    Aes128Ctr,
    Aes192Ctr,
    Aes256Ctr,
    Aes128Cbc,
    Aes256Cbc,
}

impl CipherAlg {
    pub fn key_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Aes128Ctr | Self::Aes128Cbc => 16,
            Self::Aes192Ctr => 24,
            Self::Aes256Ctr | Self::Aes256Cbc => 32,
        }
    }

    /// Size of the IV (CTR) or initial chaining value (CBC).
    pub fn iv_size(self) -> usize {
        match self {
            Self::None => 0,
            _ => BLOCK,
        }
    }

    pub fn block_size(self) -> usize {
        match self {
            // RFC 4253 §6: the `none` cipher has an effective block size of 8.
            Self::None => 8,
            _ => BLOCK,
        }
    }

    fn is_ctr(self) -> bool {
        matches!(self, Self::Aes128Ctr | Self::Aes192Ctr | Self::Aes256Ctr)
    }

    /// Applies this cipher to `data` in place.
    ///
    /// `chain` is the per-direction chaining state: for CTR it is the cumulative byte
    /// offset of the keystream consumed so far; for CBC it is the current chaining IV
    /// (updated in place to the last ciphertext block processed).
    pub fn apply(
        self,
        key: &[u8],
        iv: &[u8],
        chain_offset: &mut u64,
        chain_iv: &mut Vec<u8>,
        data: &mut [u8],
        encrypt: bool,
    ) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Aes128Ctr => {
                ctr_apply::<aes::Aes128>(key, iv, *chain_offset, data)?;
                *chain_offset += data.len() as u64;
                Ok(())
            }
            Self::Aes192Ctr => {
                ctr_apply::<aes::Aes192>(key, iv, *chain_offset, data)?;
                *chain_offset += data.len() as u64;
                Ok(())
            }
            Self::Aes256Ctr => {
                ctr_apply::<aes::Aes256>(key, iv, *chain_offset, data)?;
                *chain_offset += data.len() as u64;
                Ok(())
            }
            Self::Aes128Cbc => {
                let base = if chain_iv.is_empty() { iv } else { chain_iv.as_slice() };
                let next = if encrypt {
                    cbc_encrypt::<aes::Aes128>(key, base, data)?
                } else {
                    cbc_decrypt::<aes::Aes128>(key, base, data)?
                };
                *chain_iv = next;
                Ok(())
            }
            Self::Aes256Cbc => {
                let base = if chain_iv.is_empty() { iv } else { chain_iv.as_slice() };
                let next = if encrypt {
                    cbc_encrypt::<aes::Aes256>(key, base, data)?
                } else {
                    cbc_decrypt::<aes::Aes256>(key, base, data)?
                };
                *chain_iv = next;
                Ok(())
            }
        }
    }

    /// Peeks the decryption of a single leading block without mutating any chaining state.
    /// Used by the framer to learn `packet_length` before the full record has arrived.
    pub fn peek_block(self, key: &[u8], iv: &[u8], chain_offset: u64, chain_iv: &[u8], block: &[u8]) -> Result<Vec<u8>> {
        let mut scratch = block.to_vec();

        match self {
            Self::None => {}
            Self::Aes128Ctr => ctr_apply::<aes::Aes128>(key, iv, chain_offset, &mut scratch)?,
            Self::Aes192Ctr => ctr_apply::<aes::Aes192>(key, iv, chain_offset, &mut scratch)?,
            Self::Aes256Ctr => ctr_apply::<aes::Aes256>(key, iv, chain_offset, &mut scratch)?,
            Self::Aes128Cbc => {
                let base = if chain_iv.is_empty() { iv } else { chain_iv };
                cbc_decrypt::<aes::Aes128>(key, base, &mut scratch)?;
            }
            Self::Aes256Cbc => {
                let base = if chain_iv.is_empty() { iv } else { chain_iv };
                cbc_decrypt::<aes::Aes256>(key, base, &mut scratch)?;
            }
        }

        Ok(scratch)
    }

    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

fn ctr_apply<C: BlockEncrypt + KeyInit>(key: &[u8], iv: &[u8], offset: u64, data: &mut [u8]) -> Result<()> {
    let cipher = C::new_from_slice(key).map_err(|_| Error::Malformed("bad cipher key length".into()))?;

    let mut counter = u128::from_be_bytes(iv.try_into().map_err(|_| Error::Malformed("bad iv length".into()))?);
    counter = counter.wrapping_add((offset / BLOCK as u64) as u128);

    let mut pos_in_block = (offset % BLOCK as u64) as usize;
    let mut idx = 0;

    while idx < data.len() {
        let mut keystream = GenericArray::from(counter.to_be_bytes());
        cipher.encrypt_block(&mut keystream);

        let take = (BLOCK - pos_in_block).min(data.len() - idx);
        for i in 0..take {
            data[idx + i] ^= keystream[pos_in_block + i];
        }

        idx += take;
        pos_in_block = 0;
        counter = counter.wrapping_add(1);
    }

    Ok(())
}

fn cbc_decrypt<C: BlockDecrypt + KeyInit>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slice(key).map_err(|_| Error::Malformed("bad cipher key length".into()))?;
    if data.len() % BLOCK != 0 {
        return Err(Error::Malformed("ciphertext not block-aligned".into()));
    }

    let mut prev = iv.to_vec();

    for block in data.chunks_mut(BLOCK) {
        let ciphertext = block.to_vec();
        let mut generic = GenericArray::clone_from_slice(block);
        cipher.decrypt_block(&mut generic);

        for i in 0..BLOCK {
            block[i] = generic[i] ^ prev[i];
        }

        prev = ciphertext;
    }

    Ok(prev)
}

fn cbc_encrypt<C: BlockEncrypt + KeyInit>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slice(key).map_err(|_| Error::Malformed("bad cipher key length".into()))?;
    if data.len() % BLOCK != 0 {
        return Err(Error::Malformed("plaintext not block-aligned".into()));
    }

    let mut prev = iv.to_vec();

    for block in data.chunks_mut(BLOCK) {
        for i in 0..BLOCK {
            block[i] ^= prev[i];
        }

        let mut generic = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut generic);
        block.copy_from_slice(&generic);

        prev = block.to_vec();
    }

    Ok(prev)
}
