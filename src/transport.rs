//! Drives version exchange, KEXINIT negotiation, the DH exchange, and the NEWKEYS barrier.
//!
//! Everything past `SERVICE_REQUEST`/`ssh-userauth` is delegated to [`crate::auth`] by the
//! [`crate::session::Session`] facade; this module only knows about the transport layer.

use num_bigint::BigUint;

use crate::{
    error::{Error, Result},
    hostkey::HostKey,
    kex::{self, Negotiated},
    keys::{self, Keys},
    message::{self, DisconnectReason, KexInit, Message},
    provider::{DiffieHellman, Random},
};

/// Transport-layer state: banners, negotiated algorithms, key material on both sides of the
/// `NEWKEYS` barrier, and which inbound message id is currently admissible.
pub struct Transport {
    banner: String,
    host_key_algorithm: String,

    peer_banner: Option<String>,
    our_kexinit: KexInit,
    peer_kexinit: Option<KexInit>,
    negotiated: Option<Negotiated>,

    session_id: Option<Vec<u8>>,

    inbound: Keys,
    outbound: Keys,
    pending_in: Option<Keys>,
    pending_out: Option<Keys>,

    expected: Option<u8>,
    ignore_next_packet: bool,
    first_kex_done: bool,
}

impl Transport {
    pub fn new(banner: String, host_key_algorithm: &str, rng: &mut dyn Random) -> Self {
        Self {
            banner,
            host_key_algorithm: host_key_algorithm.to_string(),
            peer_banner: None,
            our_kexinit: kex::propose(host_key_algorithm, rng),
            peer_kexinit: None,
            negotiated: None,
            session_id: None,
            inbound: Keys::plaintext(),
            outbound: Keys::plaintext(),
            pending_in: None,
            pending_out: None,
            expected: Some(message::KEXINIT),
            ignore_next_packet: false,
            first_kex_done: false,
        }
    }

    pub fn our_kexinit(&self) -> &KexInit {
        &self.our_kexinit
    }

    pub fn expected(&self) -> Option<u8> {
        self.expected
    }

    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    pub fn inbound_keys(&mut self) -> &mut Keys {
        &mut self.inbound
    }

    pub fn outbound_keys(&mut self) -> &mut Keys {
        &mut self.outbound
    }

    /// Whether the next inbound packet must be silently dropped (the peer optimistically
    /// guessed a first KEX packet we didn't ask for). One-shot: clears itself once read.
    pub fn take_ignore_next_packet(&mut self) -> bool {
        std::mem::take(&mut self.ignore_next_packet)
    }

    /// `banner` is the peer's identification string with the mandatory `SSH-2.0-` prefix
    /// already stripped (as surfaced to the host via `Message::Version`); the exchange hash
    /// needs the full line, so it's reconstructed here rather than threaded through twice.
    pub fn handle_version(&mut self, banner: String) {
        self.peer_banner = Some(format!("SSH-2.0-{banner}"));
        self.expected = Some(message::KEXINIT);
    }

    pub fn handle_kexinit(&mut self, peer: KexInit) -> Result<()> {
        let negotiated = kex::negotiate(&self.our_kexinit, &peer)?;
        self.ignore_next_packet = kex::should_ignore_next_packet(&self.our_kexinit, &peer);

        self.negotiated = Some(negotiated);
        self.peer_kexinit = Some(peer);
        self.expected = Some(message::KEXDH_INIT);

        Ok(())
    }

    pub fn handle_kexdh_init(
        &mut self,
        e: BigUint,
        host_key: &HostKey,
        dh: &mut dyn DiffieHellman,
    ) -> Result<Vec<Message>> {
        if self.pending_in.is_some() || self.pending_out.is_some() {
            return Err(Error::Unexpected);
        }

        let negotiated = self.negotiated.ok_or(Error::Unexpected)?;
        let peer_banner = self.peer_banner.as_deref().ok_or(Error::Unexpected)?;
        let peer_kexinit = self.peer_kexinit.as_ref().ok_or(Error::Unexpected)?;

        let exchange = kex::server_exchange(
            dh,
            host_key,
            peer_banner,
            &self.banner,
            &peer_kexinit.raw,
            &self.our_kexinit.raw,
            &e,
        )?;

        let session_id = self.session_id.get_or_insert_with(|| exchange.hash.clone()).clone();

        let pair = keys::derive(
            &exchange.shared_secret,
            &exchange.hash,
            &session_id,
            negotiated.client_to_server_cipher,
            negotiated.client_to_server_mac,
            negotiated.server_to_client_cipher,
            negotiated.server_to_client_mac,
        );

        self.pending_in = Some(pair.client_to_server);
        self.pending_out = Some(pair.server_to_client);
        self.expected = Some(message::NEWKEYS);

        Ok(vec![
            Message::KexdhReply {
                host_key: host_key.blob()?,
                f: exchange.f,
                signature: exchange.signature,
            },
            Message::NewKeys,
        ])
    }

    /// Installs the peer's newly negotiated inbound keys at the `NEWKEYS` barrier.
    ///
    /// The pending key set adopts the current inbound sequence number, which by this point
    /// already accounts for the `NEWKEYS` packet itself having been parsed under the old keys.
    pub fn handle_newkeys_inbound(&mut self) -> Result<()> {
        let pending = self.pending_in.take().ok_or(Error::Unexpected)?;
        self.inbound = pending.adopting_sequence(&self.inbound);

        if !self.first_kex_done {
            self.first_kex_done = true;
            self.expected = Some(message::SERVICE_REQUEST);
        } else {
            self.expected = None;
        }

        Ok(())
    }

    /// Installs our own pending outbound keys; the caller must invoke this immediately after
    /// encoding the `NEWKEYS` message we emit, so later messages go out under the new keys.
    pub fn install_pending_outbound(&mut self) {
        if let Some(pending) = self.pending_out.take() {
            self.outbound = pending.adopting_sequence(&self.outbound);
        }
    }

    pub fn handle_service_request(&mut self, service_name: &str) -> Vec<Message> {
        if service_name == "ssh-userauth" {
            self.expected = Some(message::USERAUTH_REQUEST);

            vec![Message::ServiceAccept {
                service_name: service_name.to_string(),
            }]
        } else {
            vec![Message::Disconnect {
                reason: DisconnectReason::ServiceNotAvailable,
                description: format!("unsupported service `{service_name}`"),
            }]
        }
    }

    /// Host-triggered rekey: sends a fresh `KEXINIT` and rewinds negotiation state.
    pub fn request_rekey(&mut self, rng: &mut dyn Random) -> Message {
        self.our_kexinit = kex::propose(&self.host_key_algorithm, rng);
        self.negotiated = None;
        self.peer_kexinit = None;
        self.expected = Some(message::KEXINIT);

        Message::KexInit(self.our_kexinit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ModPow, OsRandom};

    fn test_host_key() -> HostKey {
        HostKey::Private(
            ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519).unwrap(),
        )
    }

    #[test]
    fn fresh_transport_expects_kexinit() {
        let mut rng = OsRandom;
        let transport = Transport::new("SSH-2.0-awa_ssh_test".into(), "ssh-ed25519", &mut rng);

        assert_eq!(transport.expected(), Some(message::KEXINIT));
    }

    #[test]
    fn kexdh_init_before_kexinit_is_rejected() {
        let mut rng = OsRandom;
        let mut dh = ModPow;
        let mut transport = Transport::new("SSH-2.0-awa_ssh_test".into(), "ssh-ed25519", &mut rng);
        let host_key = test_host_key();

        let result = transport.handle_kexdh_init(BigUint::from(2u8), &host_key, &mut dh);
        assert!(matches!(result, Err(Error::Unexpected)));
    }

    #[test]
    fn service_accept_transitions_to_userauth() {
        let mut rng = OsRandom;
        let mut transport = Transport::new("SSH-2.0-awa_ssh_test".into(), "ssh-ed25519", &mut rng);

        let out = transport.handle_service_request("ssh-userauth");
        assert!(matches!(out.as_slice(), [Message::ServiceAccept { .. }]));
        assert_eq!(transport.expected(), Some(message::USERAUTH_REQUEST));
    }

    #[test]
    fn unknown_service_is_rejected() {
        let mut rng = OsRandom;
        let mut transport = Transport::new("SSH-2.0-awa_ssh_test".into(), "ssh-ed25519", &mut rng);

        let out = transport.handle_service_request("ssh-connection");
        assert!(matches!(out.as_slice(), [Message::Disconnect { .. }]));
    }
}
