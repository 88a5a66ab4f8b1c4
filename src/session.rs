//! The single object a host program drives: feed bytes in, poll messages out.

use crate::{
    auth::{self, AuthState},
    banner,
    config::Config,
    error::{Error, Result},
    framer,
    message::{self, Message},
    transport::Transport,
};

/// A pure transport + userauth state machine for one SSH connection's server side.
///
/// `Session` never touches a socket: the host calls [`feed`](Session::feed) with inbound
/// bytes, [`poll`](Session::poll) to pull out the next parsed message, [`handle`](Session::handle)
/// to react to it, and [`encode`](Session::encode)/[`encode_many`](Session::encode_many) to turn
/// the resulting messages back into bytes to write to the socket.
pub struct Session {
    config: Config,
    transport: Transport,
    auth: AuthState,
    buffer: Vec<u8>,
    peer_banner_seen: bool,
}

impl Session {
    /// Creates a session and returns the bytes the host must write first: our version
    /// banner followed by our framed `KEXINIT`.
    pub fn new(mut config: Config) -> (Self, Vec<u8>) {
        let our_banner = banner::ours();
        let host_key_algorithm = config.host_key_algorithm().to_string();

        let mut transport = Transport::new(our_banner.clone(), &host_key_algorithm, config.random.as_mut());

        let kexinit_payload = Message::KexInit(transport.our_kexinit().clone()).encode();
        let framed = framer::build_packet(&kexinit_payload, transport.outbound_keys(), config.random.as_mut())
            .expect("encoding KEXINIT under the plaintext sentinel never fails");

        let mut out = format!("{our_banner}\r\n").into_bytes();
        out.extend_from_slice(&framed);

        let session = Self {
            config,
            transport,
            auth: AuthState::default(),
            buffer: Vec::new(),
            peer_banner_seen: false,
        };

        (session, out)
    }

    /// Appends inbound bytes to the session's read buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Parses and returns the next complete inbound message, or `Ok(None)` if the buffer
    /// doesn't yet hold one.
    pub fn poll(&mut self) -> Result<Option<Message>> {
        if !self.peer_banner_seen {
            return match banner::try_parse(&self.buffer)? {
                None => Ok(None),
                Some((peer_banner, consumed)) => {
                    self.buffer.drain(..consumed);
                    self.peer_banner_seen = true;

                    Ok(Some(Message::Version(peer_banner)))
                }
            };
        }

        let decoded = match framer::try_parse(&self.buffer, self.transport.inbound_keys())? {
            None => return Ok(None),
            Some(decoded) => decoded,
        };

        self.buffer.drain(..decoded.consumed);

        if self.transport.take_ignore_next_packet() {
            tracing::debug!("discarding optimistically-guessed first kex packet");

            return Ok(None);
        }

        Message::decode(&decoded.payload).map(Some)
    }

    /// Processes one parsed message, returning the messages the host should encode and send.
    pub fn handle(&mut self, message: Message) -> Result<Vec<Message>> {
        let required = match &message {
            Message::Version(_) | Message::Disconnect { .. } | Message::Ignore { .. } | Message::Debug { .. } => None,
            Message::KexInit(_) => Some(message::KEXINIT),
            Message::KexdhInit { .. } => Some(message::KEXDH_INIT),
            Message::NewKeys => Some(message::NEWKEYS),
            Message::ServiceRequest { .. } => Some(message::SERVICE_REQUEST),
            Message::UserauthRequest { .. } => Some(message::USERAUTH_REQUEST),
            _ => return Err(Error::Unhandled),
        };

        if let Some(id) = required {
            self.check_expected(id)?;
        }

        match message {
            Message::Version(banner) => {
                self.transport.handle_version(banner);
                Ok(Vec::new())
            }
            Message::Disconnect { .. } => Ok(Vec::new()),
            Message::Ignore { .. } => Ok(Vec::new()),
            Message::Debug { message, .. } => {
                tracing::debug!(%message, "received a debug message");
                Ok(Vec::new())
            }
            Message::KexInit(kexinit) => {
                self.transport.handle_kexinit(kexinit)?;
                Ok(Vec::new())
            }
            Message::KexdhInit { e } => {
                self.transport
                    .handle_kexdh_init(e, &self.config.host_key, self.config.dh.as_mut())
            }
            Message::NewKeys => {
                self.transport.handle_newkeys_inbound()?;
                Ok(Vec::new())
            }
            Message::ServiceRequest { service_name } => {
                let mut out = self.transport.handle_service_request(&service_name);

                if service_name == "ssh-userauth" {
                    if let Some(banner) = &self.config.banner {
                        out.push(Message::UserauthBanner { message: banner.clone() });
                    }
                }

                Ok(out)
            }
            Message::UserauthRequest {
                username,
                service_name,
                method,
            } => {
                let session_id = self.transport.session_id().ok_or(Error::Unexpected)?.to_vec();

                auth::handle_request(
                    &mut self.auth,
                    &session_id,
                    self.config.users.as_ref(),
                    &username,
                    &service_name,
                    &method,
                )
            }
            _ => Err(Error::Unhandled),
        }
    }

    fn check_expected(&self, id: u8) -> Result<()> {
        match self.transport.expected() {
            Some(expected) if expected == id => Ok(()),
            Some(_) => Err(Error::Unexpected),
            None => Ok(()),
        }
    }

    /// Serializes and frames a single outbound message under the current outbound keys.
    ///
    /// Encoding the session's own `NewKeys` message atomically installs the pending outbound
    /// keys afterward, so every later call encodes under the freshly negotiated key set.
    pub fn encode(&mut self, message: &Message) -> Result<Vec<u8>> {
        if let Message::Version(_) = message {
            return Err(Error::Unexpected);
        }

        let payload = message.encode();
        let framed = framer::build_packet(&payload, self.transport.outbound_keys(), self.config.random.as_mut())?;

        if matches!(message, Message::NewKeys) {
            self.transport.install_pending_outbound();
        }

        Ok(framed)
    }

    /// Encodes several messages in order, short-circuiting on the first error.
    pub fn encode_many(&mut self, messages: &[Message]) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        for message in messages {
            out.extend_from_slice(&self.encode(message)?);
        }

        Ok(out)
    }

    /// Host-triggered rekey: builds a fresh `KEXINIT` and restarts negotiation. The host
    /// is responsible for encoding and sending the returned message.
    pub fn request_rekey(&mut self) -> Message {
        self.transport.request_rekey(self.config.random.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Directory;

    fn test_config() -> Config {
        let key = ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519).unwrap();

        Config::new(key, Directory::new())
    }

    #[test]
    fn new_session_emits_banner_then_kexinit() {
        let (_, out) = Session::new(test_config());

        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("SSH-2.0-awa_ssh_"));
    }

    #[test]
    fn poll_without_input_yields_none() {
        let (mut session, _) = Session::new(test_config());

        assert!(session.poll().unwrap().is_none());
    }

    #[test]
    fn feeding_a_banner_yields_version_message() {
        let (mut session, _) = Session::new(test_config());

        session.feed(b"SSH-2.0-OpenSSH_9.6\r\n");
        let message = session.poll().unwrap().unwrap();

        assert!(matches!(message, Message::Version(ref v) if v == "OpenSSH_9.6"));
    }

    #[test]
    fn version_out_of_turn_cannot_be_encoded() {
        let (mut session, _) = Session::new(test_config());

        assert!(session.encode(&Message::Version("x".into())).is_err());
    }
}
