//! Кадры Engine.IO v4 / Socket.IO v5 поверх текстового WebSocket.
//!
//! Только то, что нужно клиенту одного namespace: handshake, heartbeat,
//! connect/disconnect и JSON-события. Бинарные вложения отклоняются.

use crate::config::ENGINE_IO_PATH;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

pub const EVENT_JOIN: &str = "join";
pub const EVENT_OFFER: &str = "offer";
pub const EVENT_ANSWER: &str = "answer";

pub const DEFAULT_NAMESPACE: &str = "/";

/// Параметры из open-пакета Engine.IO
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Пакет транспортного уровня (Engine.IO)
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty Engine.IO frame".into()))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::Protocol(format!(
                "unknown Engine.IO packet type {other:?}"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            // клиент никогда не шлёт open; сервер шлёт его первым
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Пакет уровня Socket.IO (содержимое Engine.IO message)
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        data: Value,
    },
    Ack {
        namespace: String,
        id: u64,
        data: Value,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn event(name: &str, data: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            name: name.to_string(),
            data,
        }
    }

    pub fn decode(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty Socket.IO packet".into()))?;
        let rest = chars.as_str();

        let (namespace, rest) = split_namespace(rest);
        let (id, payload) = split_ack_id(rest)?;
        let payload = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(payload)?)
        };

        match kind {
            '0' => Ok(Self::Connect {
                namespace,
                data: payload,
            }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let (name, data) = split_event(payload)?;
                Ok(Self::Event {
                    namespace,
                    id,
                    name,
                    data,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| Error::Protocol("ack without id".into()))?;
                Ok(Self::Ack {
                    namespace,
                    id,
                    data: payload.unwrap_or(Value::Null),
                })
            }
            '4' => Ok(Self::ConnectError {
                namespace,
                data: payload.unwrap_or(Value::Null),
            }),
            '5' | '6' => Err(Error::Protocol(
                "binary Socket.IO packets are not supported".into(),
            )),
            other => Err(Error::Protocol(format!(
                "unknown Socket.IO packet type {other:?}"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect { namespace, data } => {
                let mut out = format!("0{}", namespace_prefix(namespace));
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
            Self::Disconnect { namespace } => {
                format!("1{}", namespace_prefix(namespace).trim_end_matches(','))
            }
            Self::Event {
                namespace,
                id,
                name,
                data,
            } => {
                let args = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                format!(
                    "2{}{}{}",
                    namespace_prefix(namespace),
                    id.map(|i| i.to_string()).unwrap_or_default(),
                    args
                )
            }
            Self::Ack {
                namespace,
                id,
                data,
            } => format!("3{}{}{}", namespace_prefix(namespace), id, data),
            Self::ConnectError { namespace, data } => {
                format!("4{}{}", namespace_prefix(namespace), data)
            }
        }
    }

    /// Кодирует пакет в готовый текстовый кадр WebSocket
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn split_ack_id(rest: &str) -> Result<(Option<u64>, &str)> {
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return Ok((None, rest));
    }
    let id = rest[..digits]
        .parse::<u64>()
        .map_err(|e| Error::Protocol(format!("bad ack id: {e}")))?;
    Ok((Some(id), &rest[digits..]))
}

fn split_event(payload: Option<Value>) -> Result<(String, Value)> {
    let Some(Value::Array(mut args)) = payload else {
        return Err(Error::Protocol("event payload is not an array".into()));
    };
    if args.is_empty() {
        return Err(Error::Protocol("event without name".into()));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(Error::Protocol(format!(
                "event name is not a string: {other}"
            )))
        }
    };
    let data = if args.is_empty() {
        Value::Null
    } else {
        args.remove(0)
    };
    Ok((name, data))
}

/// http(s)://host:port → ws(s)://host:port/socket.io/?EIO=4&transport=websocket
pub fn socket_io_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::Protocol(format!(
                "unsupported signaling URL scheme {other:?}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Protocol(format!("cannot switch {base} to {scheme}")))?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(ENGINE_IO_PATH);
    }
    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}
