//! Drives a real [`Session`] through banner exchange, key exchange, and userauth, playing
//! the client side by hand with the same crate's low-level building blocks — this is the
//! only way to exercise the full wire protocol since the crate implements the server role
//! exclusively.

use awa_ssh::{
    banner, framer, hostkey::HostKey, kex, keys, message::Message, provider::Group, user::{AuthorizedKey, Directory, User},
    Config, Session,
};
use num_bigint::BigUint;
use rand::RngCore;
use rstest::rstest;
use sha2::{Digest, Sha256};
use test_log::test;

const CLIENT_BANNER: &str = "SSH-2.0-test_client_1.0";

struct ClientHandshake {
    client_to_server: keys::Keys,
    server_to_client: keys::Keys,
    session_id: Vec<u8>,
}

/// Feeds `session` the client's banner and `KEXINIT`, answers the server's `KEXDH_REPLY`,
/// completes `NEWKEYS` on both sides, and returns the resulting key material plus whatever
/// bytes the server produced for the client to "send back" along the way.
fn run_kex(session: &mut Session, server_greeting: &[u8]) -> (ClientHandshake, Vec<u8>) {
    let mut outbound_to_server = Vec::new();

    // Peel the server's own banner + KEXINIT out of its greeting, to learn its exact
    // (randomly-cookied) KexInit rather than reconstructing one blind.
    let mut greeting = server_greeting.to_vec();
    let (_, consumed) = banner::try_parse(&greeting).unwrap().unwrap();
    greeting.drain(..consumed);

    let mut plaintext_rx = keys::Keys::plaintext();
    let decoded = framer::try_parse(&greeting, &mut plaintext_rx).unwrap().unwrap();
    let server_kexinit = match Message::decode(&decoded.payload).unwrap() {
        Message::KexInit(kexinit) => kexinit,
        other => panic!("expected KEXINIT, got {other:?}"),
    };

    // Client sends its banner + its own KEXINIT.
    outbound_to_server.extend_from_slice(format!("{CLIENT_BANNER}\r\n").as_bytes());
    let client_kexinit = kex::propose("ssh-ed25519", &mut rand_provider());
    let mut plaintext_tx = keys::Keys::plaintext();
    outbound_to_server.extend_from_slice(
        &framer::build_packet(&Message::KexInit(client_kexinit.clone()).encode(), &mut plaintext_tx, &mut rand_provider())
            .unwrap(),
    );

    session.feed(&outbound_to_server);
    outbound_to_server.clear();

    while let Some(message) = session.poll().unwrap() {
        let replies = session.handle(message).unwrap();
        outbound_to_server.clear();
        outbound_to_server.extend_from_slice(&session.encode_many(&replies).unwrap());

        if !replies.is_empty() {
            break;
        }
    }

    // Client picks its DH secret and public value.
    let (g, p) = Group::Group14.params();
    let mut y_bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut y_bytes);
    let y_c = BigUint::from_bytes_be(&y_bytes) % &p;
    let e = g.modpow(&y_c, &p);

    let kexdh_init = Message::KexdhInit { e: e.clone() };
    let framed = framer::build_packet(&kexdh_init.encode(), &mut plaintext_tx, &mut rand_provider()).unwrap();
    session.feed(&framed);

    let message = session.poll().unwrap().unwrap();
    let replies = session.handle(message).unwrap();
    let server_bytes = session.encode_many(&replies).unwrap();

    let (host_key_blob, f, signature) = {
        let mut remaining = server_bytes.as_slice();
        let decoded = framer::try_parse(remaining, &mut plaintext_rx).unwrap().unwrap();
        remaining = &remaining[decoded.consumed..];

        let reply = match Message::decode(&decoded.payload).unwrap() {
            Message::KexdhReply { host_key, f, signature } => (host_key, f, signature),
            other => panic!("expected KEXDH_REPLY, got {other:?}"),
        };

        let decoded_newkeys = framer::try_parse(remaining, &mut plaintext_rx).unwrap().unwrap();
        assert!(matches!(Message::decode(&decoded_newkeys.payload).unwrap(), Message::NewKeys));

        reply
    };

    let k_client = f.modpow(&y_c, &p);

    let mut transcript = Vec::new();
    awa_ssh::wire::put_string(&mut transcript, CLIENT_BANNER.as_bytes());
    awa_ssh::wire::put_string(&mut transcript, banner::ours().as_bytes());
    awa_ssh::wire::put_string(&mut transcript, &client_kexinit.raw);
    awa_ssh::wire::put_string(&mut transcript, &server_kexinit.raw);
    awa_ssh::wire::put_string(&mut transcript, &host_key_blob);
    awa_ssh::wire::put_mpint(&mut transcript, &e);
    awa_ssh::wire::put_mpint(&mut transcript, &f);
    awa_ssh::wire::put_mpint(&mut transcript, &k_client);
    let hash = Sha256::digest(&transcript).to_vec();

    let server_public_key = HostKey::from_public_blob(&host_key_blob);
    server_public_key.verify(&hash, &signature).expect("server's signature over H must verify");

    let negotiated = kex::negotiate(&server_kexinit, &client_kexinit).unwrap();
    let pair = keys::derive(
        &k_client,
        &hash,
        &hash, // session_id == first exchange hash
        negotiated.client_to_server_cipher,
        negotiated.client_to_server_mac,
        negotiated.server_to_client_cipher,
        negotiated.server_to_client_mac,
    );

    // Client acknowledges with its own NEWKEYS, still under the plaintext sentinel.
    let client_newkeys = framer::build_packet(&Message::NewKeys.encode(), &mut plaintext_tx, &mut rand_provider()).unwrap();
    session.feed(&client_newkeys);
    let message = session.poll().unwrap().unwrap();
    assert!(session.handle(message).unwrap().is_empty());

    // The NEWKEYS barrier preserves each direction's sequence counter across the rekey
    // (`Keys::adopting_sequence`): the server's inbound counter already accounts for the
    // three plaintext packets (KEXINIT, KEXDH_INIT, NEWKEYS) the client sent, and its
    // outbound counter for the three it sent back (KEXINIT, KEXDH_REPLY, NEWKEYS). The
    // client-side key material returned here must carry the same counts, or its first
    // encrypted packet will be MAC'd under the wrong sequence number.
    (
        ClientHandshake {
            client_to_server: pair.client_to_server.adopting_sequence(&plaintext_tx),
            server_to_client: pair.server_to_client.adopting_sequence(&plaintext_rx),
            session_id: hash,
        },
        Vec::new(),
    )
}

fn rand_provider() -> awa_ssh::provider::OsRandom {
    awa_ssh::provider::OsRandom
}

fn session_with_alice() -> (Session, Vec<u8>) {
    let host_key = ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519).unwrap();

    let mut directory = Directory::new();
    directory.insert(User {
        name: "alice".into(),
        password: Some("hunter2".into()),
        public_keys: vec![AuthorizedKey {
            algorithm: "ssh-ed25519".into(),
            blob: vec![1, 2, 3, 4],
        }],
    });

    Config::new(host_key, directory).pipe(Session::new)
}

trait Pipe: Sized {
    fn pipe<R>(self, f: impl FnOnce(Self) -> R) -> R {
        f(self)
    }
}
impl<T> Pipe for T {}

#[test(rstest)]
fn full_handshake_agrees_on_keys() {
    let (mut session, greeting) = session_with_alice();

    let (handshake, _) = run_kex(&mut session, &greeting);

    assert_eq!(handshake.session_id.len(), 32);
    assert!(!handshake.client_to_server.cipher_key.is_empty());
    assert_ne!(handshake.client_to_server.cipher_key, handshake.server_to_client.cipher_key);
}

#[test(rstest)]
fn password_login_then_wrong_password_and_unknown_user() {
    let (mut session, greeting) = session_with_alice();
    let (handshake, _) = run_kex(&mut session, &greeting);

    let mut client_tx = handshake.client_to_server.clone();

    let service_request = Message::ServiceRequest {
        service_name: "ssh-userauth".into(),
    };
    let framed = framer::build_packet(&service_request.encode(), &mut client_tx, &mut rand_provider()).unwrap();
    session.feed(&framed);

    let message = session.poll().unwrap().unwrap();
    let replies = session.handle(message).unwrap();
    assert!(matches!(replies.as_slice(), [Message::ServiceAccept { .. }]));
    session.encode_many(&replies).unwrap();

    // Unknown user.
    let request = Message::UserauthRequest {
        username: "mallory".into(),
        service_name: "ssh-connection".into(),
        method: awa_ssh::message::AuthMethod::Password {
            password: "anything".into(),
            new_password: None,
        },
    };
    let framed = framer::build_packet(&request.encode(), &mut client_tx, &mut rand_provider()).unwrap();
    session.feed(&framed);
    let message = session.poll().unwrap().unwrap();
    let replies = session.handle(message).unwrap();
    assert!(matches!(replies.as_slice(), [Message::UserauthFailure { .. }]));
    session.encode_many(&replies).unwrap();

    // Wrong password for a real user.
    let request = Message::UserauthRequest {
        username: "alice".into(),
        service_name: "ssh-connection".into(),
        method: awa_ssh::message::AuthMethod::Password {
            password: "wrong".into(),
            new_password: None,
        },
    };
    let framed = framer::build_packet(&request.encode(), &mut client_tx, &mut rand_provider()).unwrap();
    session.feed(&framed);
    let message = session.poll().unwrap().unwrap();
    let replies = session.handle(message).unwrap();
    assert!(matches!(replies.as_slice(), [Message::UserauthFailure { .. }]));
    session.encode_many(&replies).unwrap();

    // Correct password succeeds.
    let request = Message::UserauthRequest {
        username: "alice".into(),
        service_name: "ssh-connection".into(),
        method: awa_ssh::message::AuthMethod::Password {
            password: "hunter2".into(),
            new_password: None,
        },
    };
    let framed = framer::build_packet(&request.encode(), &mut client_tx, &mut rand_provider()).unwrap();
    session.feed(&framed);
    let message = session.poll().unwrap().unwrap();
    let replies = session.handle(message).unwrap();
    assert!(matches!(replies.as_slice(), [Message::UserauthSuccess]));
}
