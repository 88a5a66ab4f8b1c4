//! KEXINIT construction, algorithm negotiation, and the Diffie-Hellman exchange itself.

use digest::Digest;
use num_bigint::BigUint;
use sha2::Sha256;

use crate::{
    cipher::CipherAlg,
    error::{Error, Result},
    hostkey::HostKey,
    mac::MacAlg,
    message::KexInit,
    provider::{DiffieHellman, Group, Random},
    wire,
};

/// The one key-exchange method this core speaks.
pub const KEX_ALGORITHM: &str = "diffie-hellman-group14-sha256";

fn supported_ciphers() -> Vec<String> {
    ["aes128-ctr", "aes192-ctr", "aes256-ctr", "aes128-cbc", "aes256-cbc"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn supported_macs() -> Vec<String> {
    ["hmac-sha2-256", "hmac-sha1"].iter().map(|s| s.to_string()).collect()
}

/// Builds the KEXINIT we send, carrying our supported algorithm name-lists.
pub fn propose(host_key_algorithm: &str, rng: &mut dyn Random) -> KexInit {
    let mut cookie = [0u8; 16];
    cookie.copy_from_slice(&rng.random(16));

    KexInit::new(
        cookie,
        vec![KEX_ALGORITHM.to_string()],
        vec![host_key_algorithm.to_string()],
        supported_ciphers(),
        supported_ciphers(),
        supported_macs(),
        supported_macs(),
        vec!["none".to_string()],
        vec!["none".to_string()],
        false,
    )
}

/// The algorithms this core settled on after comparing both KEXINITs.
#[derive(Debug, Clone, Copy)]
pub struct Negotiated {
    pub client_to_server_cipher: CipherAlg,
    pub server_to_client_cipher: CipherAlg,
    pub client_to_server_mac: MacAlg,
    pub server_to_client_mac: MacAlg,
}

/// Picks, for each algorithm class, the first name the client proposed that we also support.
///
/// `ours` is the KEXINIT we sent (the "server" list); `theirs` is the peer's.
pub fn negotiate(ours: &KexInit, theirs: &KexInit) -> Result<Negotiated> {
    let kex = wire::preferred(&theirs.kex_algorithms, &ours.kex_algorithms).ok_or(Error::NegotiationFailure)?;
    if kex != KEX_ALGORITHM {
        return Err(Error::NegotiationFailure);
    }

    let host_key = wire::preferred(&theirs.server_host_key_algorithms, &ours.server_host_key_algorithms)
        .ok_or(Error::NegotiationFailure)?;
    if !ours.server_host_key_algorithms.iter().any(|n| n == host_key) {
        return Err(Error::NegotiationFailure);
    }

    let parse_cipher = |name: &str| -> Result<CipherAlg> { name.parse().map_err(|_| Error::NegotiationFailure) };
    let parse_mac = |name: &str| -> Result<MacAlg> { name.parse().map_err(|_| Error::NegotiationFailure) };

    Ok(Negotiated {
        client_to_server_cipher: parse_cipher(
            wire::preferred(&theirs.encryption_client_to_server, &ours.encryption_client_to_server)
                .ok_or(Error::NegotiationFailure)?,
        )?,
        server_to_client_cipher: parse_cipher(
            wire::preferred(&theirs.encryption_server_to_client, &ours.encryption_server_to_client)
                .ok_or(Error::NegotiationFailure)?,
        )?,
        client_to_server_mac: parse_mac(
            wire::preferred(&theirs.mac_client_to_server, &ours.mac_client_to_server).ok_or(Error::NegotiationFailure)?,
        )?,
        server_to_client_mac: parse_mac(
            wire::preferred(&theirs.mac_server_to_client, &ours.mac_server_to_client).ok_or(Error::NegotiationFailure)?,
        )?,
    })
}

/// Whether the peer's optimistically-sent first KEX packet (if any) must be discarded, per
/// RFC 4253 §7.1: the peer guessed wrong if its first preferences don't match what we'd pick.
pub fn should_ignore_next_packet(ours: &KexInit, theirs: &KexInit) -> bool {
    if !theirs.first_kex_packet_follows {
        return false;
    }

    let guessed_kex = theirs.kex_algorithms.first().map(String::as_str);
    let guessed_host_key = theirs.server_host_key_algorithms.first().map(String::as_str);

    guessed_kex != Some(KEX_ALGORITHM) || guessed_host_key != ours.server_host_key_algorithms.first().map(String::as_str)
}

/// The result of completing the server side of one Diffie-Hellman group-14 exchange.
pub struct Exchange {
    pub f: BigUint,
    pub shared_secret: BigUint,
    pub hash: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Completes the exchange given the client's public value `e`, producing `f`, the shared
/// secret, the exchange hash `H`, and `H` signed by the host key.
#[allow(clippy::too_many_arguments)]
pub fn server_exchange(
    dh: &mut dyn DiffieHellman,
    host_key: &HostKey,
    peer_banner: &str,
    our_banner: &str,
    peer_kexinit_raw: &[u8],
    our_kexinit_raw: &[u8],
    e: &BigUint,
) -> Result<Exchange> {
    let (_, f, k) = dh.generate(Group::Group14, e);

    let host_blob = host_key.blob()?;

    let mut transcript = Vec::new();
    wire::put_string(&mut transcript, peer_banner.as_bytes());
    wire::put_string(&mut transcript, our_banner.as_bytes());
    wire::put_string(&mut transcript, peer_kexinit_raw);
    wire::put_string(&mut transcript, our_kexinit_raw);
    wire::put_string(&mut transcript, &host_blob);
    wire::put_mpint(&mut transcript, e);
    wire::put_mpint(&mut transcript, &f);
    wire::put_mpint(&mut transcript, &k);

    let hash = Sha256::digest(&transcript).to_vec();
    let signature = host_key.sign(&hash)?;

    Ok(Exchange {
        f,
        shared_secret: k,
        hash,
        signature,
    })
}
