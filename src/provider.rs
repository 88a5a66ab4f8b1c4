//! Injected collaborators: randomness and Diffie-Hellman exponentiation.
//!
//! The core never reads global state; these traits let a host supply deterministic
//! fixtures in tests while defaulting to real entropy/arithmetic in production.

use num_bigint::{BigUint, RandBigInt};
use rand::RngCore;

/// A source of random bytes, used for padding and for the DH private exponent.
pub trait Random {
    fn random(&mut self, n: usize) -> Vec<u8>;
}

/// The default, OS-entropy-backed [`Random`] implementation.
#[derive(Debug, Default)]
pub struct OsRandom;

impl Random for OsRandom {
    fn random(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        rand::thread_rng().fill_bytes(&mut buf);

        buf
    }
}

/// The well-known DH groups this core negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    /// RFC 3526 §3, the 2048-bit MODP group used by `diffie-hellman-group14-sha256`.
    Group14,
}

impl Group {
    /// `(generator, modulus)` for this group.
    pub fn params(self) -> (BigUint, BigUint) {
        match self {
            Self::Group14 => (BigUint::from(2u8), group14_modulus()),
        }
    }
}

/// The RFC 3526 §3 2048-bit MODP group-14 prime, `p`.
const GROUP14_MODULUS_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406",
    "B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE",
    "45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD",
    "24CF5F83655D23DCA3AD961C62F356208552BB9ED529077",
    "096966D670C354E4ABC9804F1746C08CA18217C32905E46",
    "2E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF",
    "06F4C52C9DE2BCBF6955817183995497CEA956AE515D226",
    "1898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

fn group14_modulus() -> BigUint {
    BigUint::parse_bytes(GROUP14_MODULUS_HEX.as_bytes(), 16)
        .expect("hard-coded RFC 3526 group-14 modulus parses")
}

/// Diffie-Hellman key agreement, delegated out of the core per the Non-goal against
/// in-process bignum/crypto primitive implementation of exponentiation policy.
pub trait DiffieHellman {
    /// Given the peer's public value `e`, picks a secret exponent `y` and returns
    /// `(y, f = g^y mod p, k = e^y mod p)`.
    fn generate(&mut self, group: Group, e: &BigUint) -> (BigUint, BigUint, BigUint);
}

/// The default, `num-bigint`-backed [`DiffieHellman`] implementation.
#[derive(Debug, Default)]
pub struct ModPow;

impl DiffieHellman for ModPow {
    fn generate(&mut self, group: Group, e: &BigUint) -> (BigUint, BigUint, BigUint) {
        let (g, p) = group.params();

        let mut rng = rand::thread_rng();
        let y = rng.gen_biguint_below(&p);

        let f = g.modpow(&y, &p);
        let k = e.modpow(&y, &p);

        (y, f, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group14_modulus_is_2048_bits() {
        let (_, p) = Group::Group14.params();

        assert_eq!(p.bits(), 2048);
    }

    #[test]
    fn modpow_agreement_is_symmetric() {
        let (g, p) = Group::Group14.params();

        let mut rng = rand::thread_rng();
        let y_c = rng.gen_biguint_below(&p);
        let y_s = rng.gen_biguint_below(&p);

        let e = g.modpow(&y_c, &p);
        let f = g.modpow(&y_s, &p);

        let k_client = f.modpow(&y_c, &p);
        let k_server = e.modpow(&y_s, &p);

        assert_eq!(k_client, k_server);
    }

    #[test]
    fn os_random_yields_requested_length() {
        assert_eq!(OsRandom.random(16).len(), 16);
    }
}
