//! The userauth sub-protocol: public-key probes/verification, password checks, attempt caps.

use subtle::ConstantTimeEq;

use crate::{
    error::{Error, Result},
    hostkey::HostKey,
    message::{AuthMethod, DisconnectReason, Message, USERAUTH_REQUEST},
    user::UserDb,
    wire,
};

const REQUIRED_SERVICE: &str = "ssh-connection";
const MAX_ATTEMPTS: u32 = 10;

/// Where a session stands in the userauth exchange.
///
/// At most one of these is true at a time; `InProgress` pins the username and service the
/// peer committed to on its first request, and any later request naming a different one is
/// a protocol violation rather than a fresh attempt.
#[derive(Debug, Clone)]
pub enum AuthState {
    Preauth,
    InProgress {
        username: String,
        service: String,
        failed_count: u32,
    },
    Done,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::Preauth
    }
}

/// Evaluates one `USERAUTH_REQUEST`, mutating `state` and returning the messages to emit.
pub fn handle_request(
    state: &mut AuthState,
    session_id: &[u8],
    users: &dyn UserDb,
    username: &str,
    service_name: &str,
    method: &AuthMethod,
) -> Result<Vec<Message>> {
    if matches!(state, AuthState::Done) {
        return Ok(Vec::new());
    }

    if service_name != REQUIRED_SERVICE {
        return Ok(vec![protocol_error("unsupported service for userauth")]);
    }

    if matches!(state, AuthState::Preauth) {
        *state = AuthState::InProgress {
            username: username.to_string(),
            service: service_name.to_string(),
            failed_count: 0,
        };
    }

    let AuthState::InProgress {
        username: bound_user,
        service: bound_service,
        failed_count,
    } = state
    else {
        unreachable!("transitioned into InProgress above, or returned already for Done")
    };

    if *failed_count >= MAX_ATTEMPTS {
        return Err(Error::AuthExhausted);
    }

    if username != bound_user || service_name != bound_service {
        return Ok(vec![protocol_error("username or service changed during authentication")]);
    }

    evaluate_method(state, session_id, users, username, method)
}

fn evaluate_method(
    state: &mut AuthState,
    session_id: &[u8],
    users: &dyn UserDb,
    username: &str,
    method: &AuthMethod,
) -> Result<Vec<Message>> {
    match method {
        AuthMethod::Publickey {
            algorithm,
            blob,
            signature: None,
        } => {
            if HostKey::from_public_blob(blob).algorithm_name() == algorithm {
                Ok(vec![Message::UserauthPkOk {
                    algorithm: algorithm.clone(),
                    blob: blob.clone(),
                }])
            } else {
                Ok(vec![fail(state)])
            }
        }
        AuthMethod::Publickey {
            algorithm,
            blob,
            signature: Some(signature),
        } => {
            let key = HostKey::from_public_blob(blob);
            if key.algorithm_name() != algorithm {
                return Ok(vec![fail(state)]);
            }

            let authorized = users
                .lookup(username)
                .is_some_and(|user| user.authorizes(algorithm, blob));
            if !authorized {
                return Ok(vec![fail(state)]);
            }

            let unsigned = signed_blob(session_id, username, algorithm, blob);

            match key.verify(&unsigned, signature) {
                Ok(()) => {
                    *state = AuthState::Done;
                    Ok(vec![Message::UserauthSuccess])
                }
                Err(_) => Ok(vec![fail(state)]),
            }
        }
        AuthMethod::Password {
            password,
            new_password: None,
        } => {
            let matches = users
                .lookup(username)
                .and_then(|user| user.password.as_deref())
                .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(password.as_bytes())));

            if matches {
                *state = AuthState::Done;
                Ok(vec![Message::UserauthSuccess])
            } else {
                Ok(vec![fail(state)])
            }
        }
        AuthMethod::Password { new_password: Some(_), .. } | AuthMethod::Hostbased | AuthMethod::None => {
            Ok(vec![fail(state)])
        }
    }
}

/// Builds the canonical unsigned blob a `publickey` signature is computed over
/// (RFC 4253 §7, RFC 4252 §7): `session_id`, the request id, user/service/method names,
/// the `true` flag marking a signed (not probing) request, the algorithm name, and the blob.
fn signed_blob(session_id: &[u8], username: &str, algorithm: &str, blob: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    wire::put_string(&mut out, session_id);
    out.push(USERAUTH_REQUEST);
    wire::put_string(&mut out, username.as_bytes());
    wire::put_string(&mut out, REQUIRED_SERVICE.as_bytes());
    wire::put_string(&mut out, b"publickey");
    wire::put_boolean(&mut out, true);
    wire::put_string(&mut out, algorithm.as_bytes());
    wire::put_string(&mut out, blob);

    out
}

fn fail(state: &mut AuthState) -> Message {
    if let AuthState::InProgress { failed_count, .. } = state {
        *failed_count += 1;
    }

    Message::UserauthFailure {
        continue_with: vec!["publickey".to_string(), "password".to_string()],
        partial_success: false,
    }
}

fn protocol_error(description: &str) -> Message {
    Message::Disconnect {
        reason: DisconnectReason::ProtocolError,
        description: description.to_string(),
    }
}
