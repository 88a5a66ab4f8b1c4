//! The closed catalogue of SSH messages this core produces or accepts.

use crate::{
    error::{Error, Result},
    wire::{self, Reader},
};

pub const DISCONNECT: u8 = 1;
pub const IGNORE: u8 = 2;
pub const UNIMPLEMENTED: u8 = 3;
pub const DEBUG: u8 = 4;
pub const SERVICE_REQUEST: u8 = 5;
pub const SERVICE_ACCEPT: u8 = 6;
pub const KEXINIT: u8 = 20;
pub const NEWKEYS: u8 = 21;
pub const KEXDH_INIT: u8 = 30;
pub const KEXDH_REPLY: u8 = 31;
pub const USERAUTH_REQUEST: u8 = 50;
pub const USERAUTH_FAILURE: u8 = 51;
pub const USERAUTH_SUCCESS: u8 = 52;
pub const USERAUTH_BANNER: u8 = 53;
pub const USERAUTH_PK_OK: u8 = 60;

/// SSH disconnect reason codes (RFC 4253 §11.1), restricted to the subset this core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectReason {
    KeyExchangeFailed = 3,
    ProtocolError = 2,
    MacError = 5,
    ServiceNotAvailable = 7,
    ByApplication = 11,
    NoMoreAuthMethodsAvailable = 14,
}

impl DisconnectReason {
    fn from_code(code: u32) -> Self {
        match code {
            3 => Self::KeyExchangeFailed,
            5 => Self::MacError,
            7 => Self::ServiceNotAvailable,
            11 => Self::ByApplication,
            14 => Self::NoMoreAuthMethodsAvailable,
            _ => Self::ProtocolError,
        }
    }
}

/// The negotiated algorithm name-lists carried by a `KEXINIT` message.
#[derive(Debug, Clone)]
pub struct KexInit {
    pub cookie: [u8; 16],
    pub kex_algorithms: Vec<String>,
    pub server_host_key_algorithms: Vec<String>,
    pub encryption_client_to_server: Vec<String>,
    pub encryption_server_to_client: Vec<String>,
    pub mac_client_to_server: Vec<String>,
    pub mac_server_to_client: Vec<String>,
    pub compression_client_to_server: Vec<String>,
    pub compression_server_to_client: Vec<String>,
    pub languages_client_to_server: Vec<String>,
    pub languages_server_to_client: Vec<String>,
    pub first_kex_packet_follows: bool,
    /// The exact payload this message was decoded from (or will encode to), msg-id included.
    /// Required verbatim by the exchange-hash computation (`I_C`/`I_S`).
    pub raw: Vec<u8>,
}

impl KexInit {
    fn encode_body(&self) -> Vec<u8> {
        let mut out = vec![KEXINIT];
        out.extend_from_slice(&self.cookie);
        wire::put_name_list(&mut out, &self.kex_algorithms);
        wire::put_name_list(&mut out, &self.server_host_key_algorithms);
        wire::put_name_list(&mut out, &self.encryption_client_to_server);
        wire::put_name_list(&mut out, &self.encryption_server_to_client);
        wire::put_name_list(&mut out, &self.mac_client_to_server);
        wire::put_name_list(&mut out, &self.mac_server_to_client);
        wire::put_name_list(&mut out, &self.compression_client_to_server);
        wire::put_name_list(&mut out, &self.compression_server_to_client);
        wire::put_name_list(&mut out, &self.languages_client_to_server);
        wire::put_name_list(&mut out, &self.languages_server_to_client);
        wire::put_boolean(&mut out, self.first_kex_packet_follows);
        wire::put_uint32(&mut out, 0); // reserved

        out
    }

    /// Builds a `KexInit`, computing and storing its canonical `raw` encoding.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cookie: [u8; 16],
        kex_algorithms: Vec<String>,
        server_host_key_algorithms: Vec<String>,
        encryption_client_to_server: Vec<String>,
        encryption_server_to_client: Vec<String>,
        mac_client_to_server: Vec<String>,
        mac_server_to_client: Vec<String>,
        compression_client_to_server: Vec<String>,
        compression_server_to_client: Vec<String>,
        first_kex_packet_follows: bool,
    ) -> Self {
        let mut this = Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_client_to_server,
            encryption_server_to_client,
            mac_client_to_server,
            mac_server_to_client,
            compression_client_to_server,
            compression_server_to_client,
            languages_client_to_server: Vec::new(),
            languages_server_to_client: Vec::new(),
            first_kex_packet_follows,
            raw: Vec::new(),
        };
        this.raw = this.encode_body();

        this
    }

    fn decode(reader: &mut Reader, raw: Vec<u8>) -> Result<Self> {
        let mut cookie = [0u8; 16];
        for byte in cookie.iter_mut() {
            *byte = reader.byte()?;
        }

        Ok(Self {
            cookie,
            kex_algorithms: reader.name_list()?,
            server_host_key_algorithms: reader.name_list()?,
            encryption_client_to_server: reader.name_list()?,
            encryption_server_to_client: reader.name_list()?,
            mac_client_to_server: reader.name_list()?,
            mac_server_to_client: reader.name_list()?,
            compression_client_to_server: reader.name_list()?,
            compression_server_to_client: reader.name_list()?,
            languages_client_to_server: reader.name_list()?,
            languages_server_to_client: reader.name_list()?,
            first_kex_packet_follows: reader.boolean()?,
            raw,
        })
    }
}

/// A single SSH-USERAUTH authentication method, with its method-specific payload.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    None,
    Publickey {
        algorithm: String,
        blob: Vec<u8>,
        signature: Option<Vec<u8>>,
    },
    Password {
        password: String,
        new_password: Option<String>,
    },
    Hostbased,
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Publickey { .. } => "publickey",
            Self::Password { .. } => "password",
            Self::Hostbased => "hostbased",
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        wire::put_string(out, self.name().as_bytes());

        match self {
            Self::None => {}
            Self::Publickey {
                algorithm,
                blob,
                signature,
            } => {
                wire::put_boolean(out, signature.is_some());
                wire::put_string(out, algorithm.as_bytes());
                wire::put_string(out, blob);
                if let Some(signature) = signature {
                    wire::put_string(out, signature);
                }
            }
            Self::Password {
                password,
                new_password,
            } => {
                wire::put_boolean(out, new_password.is_some());
                wire::put_string(out, password.as_bytes());
                if let Some(new_password) = new_password {
                    wire::put_string(out, new_password.as_bytes());
                }
            }
            Self::Hostbased => {}
        }
    }

    fn decode(reader: &mut Reader) -> Result<Self> {
        let name = reader.utf8()?;

        Ok(match name.as_str() {
            "none" => Self::None,
            "publickey" => {
                let has_signature = reader.boolean()?;
                let algorithm = reader.utf8()?;
                let blob = reader.string()?.to_vec();
                let signature = has_signature
                    .then(|| reader.string())
                    .transpose()?
                    .map(<[u8]>::to_vec);

                Self::Publickey {
                    algorithm,
                    blob,
                    signature,
                }
            }
            "password" => {
                let has_new = reader.boolean()?;
                let password = reader.utf8()?;
                let new_password = has_new.then(|| reader.utf8()).transpose()?;

                Self::Password {
                    password,
                    new_password,
                }
            }
            "hostbased" => Self::Hostbased,
            other => {
                return Err(Error::Malformed(format!(
                    "unsupported userauth method `{other}`"
                )))
            }
        })
    }
}

/// Every message the transport/userauth core can produce or accept.
#[derive(Debug, Clone)]
pub enum Message {
    /// Synthetic: the peer's identification line, not a numbered wire message.
    Version(String),

    Disconnect {
        reason: DisconnectReason,
        description: String,
    },
    Ignore {
        data: Vec<u8>,
    },
    Debug {
        always_display: bool,
        message: String,
    },

    ServiceRequest {
        service_name: String,
    },
    ServiceAccept {
        service_name: String,
    },

    KexInit(KexInit),
    NewKeys,

    KexdhInit {
        e: num_bigint::BigUint,
    },
    KexdhReply {
        host_key: Vec<u8>,
        f: num_bigint::BigUint,
        signature: Vec<u8>,
    },

    UserauthRequest {
        username: String,
        service_name: String,
        method: AuthMethod,
    },
    UserauthFailure {
        continue_with: Vec<String>,
        partial_success: bool,
    },
    UserauthSuccess,
    UserauthBanner {
        message: String,
    },
    UserauthPkOk {
        algorithm: String,
        blob: Vec<u8>,
    },
}

impl Message {
    /// Encodes this message's payload (message-id byte included), ready for framing.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        match self {
            Self::Version(_) => unreachable!("the banner is never framed as a binary packet"),
            Self::Disconnect { reason, description } => {
                out.push(DISCONNECT);
                wire::put_uint32(&mut out, *reason as u32);
                wire::put_string(&mut out, description.as_bytes());
                wire::put_string(&mut out, b"en");
            }
            Self::Ignore { data } => {
                out.push(IGNORE);
                wire::put_string(&mut out, data);
            }
            Self::Debug {
                always_display,
                message,
            } => {
                out.push(DEBUG);
                wire::put_boolean(&mut out, *always_display);
                wire::put_string(&mut out, message.as_bytes());
                wire::put_string(&mut out, b"en");
            }
            Self::ServiceRequest { service_name } => {
                out.push(SERVICE_REQUEST);
                wire::put_string(&mut out, service_name.as_bytes());
            }
            Self::ServiceAccept { service_name } => {
                out.push(SERVICE_ACCEPT);
                wire::put_string(&mut out, service_name.as_bytes());
            }
            Self::KexInit(kexinit) => return kexinit.encode_body(),
            Self::NewKeys => out.push(NEWKEYS),
            Self::KexdhInit { e } => {
                out.push(KEXDH_INIT);
                wire::put_mpint(&mut out, e);
            }
            Self::KexdhReply {
                host_key,
                f,
                signature,
            } => {
                out.push(KEXDH_REPLY);
                wire::put_string(&mut out, host_key);
                wire::put_mpint(&mut out, f);
                wire::put_string(&mut out, signature);
            }
            Self::UserauthRequest {
                username,
                service_name,
                method,
            } => {
                out.push(USERAUTH_REQUEST);
                wire::put_string(&mut out, username.as_bytes());
                wire::put_string(&mut out, service_name.as_bytes());
                method.encode(&mut out);
            }
            Self::UserauthFailure {
                continue_with,
                partial_success,
            } => {
                out.push(USERAUTH_FAILURE);
                wire::put_name_list(&mut out, continue_with);
                wire::put_boolean(&mut out, *partial_success);
            }
            Self::UserauthSuccess => out.push(USERAUTH_SUCCESS),
            Self::UserauthBanner { message } => {
                out.push(USERAUTH_BANNER);
                wire::put_string(&mut out, message.as_bytes());
                wire::put_string(&mut out, b"en");
            }
            Self::UserauthPkOk { algorithm, blob } => {
                out.push(USERAUTH_PK_OK);
                wire::put_string(&mut out, algorithm.as_bytes());
                wire::put_string(&mut out, blob);
            }
        }

        out
    }

    /// Decodes a message from a framed packet payload (message-id byte included).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);
        let id = reader.byte()?;

        Ok(match id {
            DISCONNECT => {
                let reason = DisconnectReason::from_code(reader.uint32()?);
                let description = reader.utf8()?;

                Self::Disconnect { reason, description }
            }
            IGNORE => Self::Ignore {
                data: reader.string()?.to_vec(),
            },
            DEBUG => Self::Debug {
                always_display: reader.boolean()?,
                message: reader.utf8()?,
            },
            SERVICE_REQUEST => Self::ServiceRequest {
                service_name: reader.utf8()?,
            },
            SERVICE_ACCEPT => Self::ServiceAccept {
                service_name: reader.utf8()?,
            },
            KEXINIT => Self::KexInit(KexInit::decode(&mut reader, payload.to_vec())?),
            NEWKEYS => Self::NewKeys,
            KEXDH_INIT => Self::KexdhInit { e: reader.mpint()? },
            KEXDH_REPLY => Self::KexdhReply {
                host_key: reader.string()?.to_vec(),
                f: reader.mpint()?,
                signature: reader.string()?.to_vec(),
            },
            USERAUTH_REQUEST => Self::UserauthRequest {
                username: reader.utf8()?,
                service_name: reader.utf8()?,
                method: AuthMethod::decode(&mut reader)?,
            },
            USERAUTH_FAILURE => Self::UserauthFailure {
                continue_with: reader.name_list()?,
                partial_success: reader.boolean()?,
            },
            USERAUTH_SUCCESS => Self::UserauthSuccess,
            USERAUTH_BANNER => Self::UserauthBanner {
                message: reader.utf8()?,
            },
            USERAUTH_PK_OK => Self::UserauthPkOk {
                algorithm: reader.utf8()?,
                blob: reader.string()?.to_vec(),
            },
            other => return Err(Error::Unhandled.into_with_id(other)),
        })
    }
}

impl Error {
    /// Tags an [`Error::Unhandled`] with the offending message id, for logging.
    fn into_with_id(self, id: u8) -> Self {
        tracing::debug!("received message id {id} outside the core's scope");

        self
    }
}
