use std::collections::VecDeque;
use std::fmt;

use ewebsock::{Options, WsEvent, WsMessage, WsReceiver, WsSender};
use tracing::{debug, error, trace};
use url::Url;

use crate::protocol::{decode_frames, handshake_request, parse_handshake_response};
use crate::transport::{HubTransport, TransportEvent, Wakeup};
use crate::{HubError, HubMessage, TransportError};

struct Conn {
    sender: WsSender,
    receiver: WsReceiver,
    handshake_done: bool,
}

/// [`HubTransport`] over a websocket, speaking the JSON hub protocol.
pub struct WebsocketTransport<W> {
    url: Url,
    wakeup: W,
    conn: Option<Conn>,
    inbox: VecDeque<TransportEvent>,
}

impl<W> fmt::Debug for WebsocketTransport<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketTransport")
            .field("url", &self.url.as_str())
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl<W: Wakeup> WebsocketTransport<W> {
    /// `hub_url` may use http(s) or ws(s); http schemes are mapped to their
    /// websocket counterparts.
    pub fn new(hub_url: &str, wakeup: W) -> Result<Self, HubError> {
        Ok(Self {
            url: websocket_url(hub_url)?,
            wakeup,
            conn: None,
            inbox: VecDeque::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn url_with_token(&self, access_token: Option<&str>) -> Url {
        let mut url = self.url.clone();
        if let Some(token) = access_token {
            url.query_pairs_mut().append_pair("access_token", token);
        }
        url
    }

    fn ingest_text(&mut self, text: &str) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        let frames = if conn.handshake_done {
            text
        } else {
            match parse_handshake_response(text) {
                Ok(rest) => {
                    conn.handshake_done = true;
                    debug!("hub handshake with {} completed", self.url);
                    self.inbox.push_back(TransportEvent::Opened {
                        connection_id: None,
                    });
                    rest
                }
                Err(err) => {
                    self.inbox
                        .push_back(TransportEvent::Error(TransportError::Handshake(
                            err.to_string(),
                        )));
                    return;
                }
            }
        };

        for frame in decode_frames(frames) {
            match frame {
                Ok(msg) => self.inbox.push_back(TransportEvent::Message(msg)),
                Err(err) => error!("hub {} frame decode error: {err}", self.url),
            }
        }
    }
}

impl<W: Wakeup> HubTransport for WebsocketTransport<W> {
    fn connect(&mut self, access_token: Option<&str>) -> Result<(), TransportError> {
        self.close();

        let url = self.url_with_token(access_token);
        let wakeup = self.wakeup.clone();
        let (sender, receiver) =
            ewebsock::connect_with_wakeup(url.as_str(), Options::default(), move || {
                wakeup.wake()
            })?;

        debug!("connecting to hub {}", self.url);
        self.conn = Some(Conn {
            sender,
            receiver,
            handshake_done: false,
        });
        Ok(())
    }

    fn send(&mut self, msg: &HubMessage) -> Result<(), TransportError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::NotOpen);
        };
        if !conn.handshake_done {
            return Err(TransportError::NotOpen);
        }

        let frame = msg
            .to_frame()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        trace!("sending {} to {}", frame, self.url);
        conn.sender.send(WsMessage::Text(frame));
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(ev) = self.inbox.pop_front() {
                return Some(ev);
            }

            let conn = self.conn.as_mut()?;
            let event = conn.receiver.try_recv()?;

            match event {
                WsEvent::Opened => {
                    conn.sender.send(WsMessage::Text(handshake_request()));
                }
                WsEvent::Message(WsMessage::Text(text)) => self.ingest_text(&text),
                #[cfg(not(target_arch = "wasm32"))]
                WsEvent::Message(WsMessage::Ping(bs)) => {
                    conn.sender.send(WsMessage::Pong(bs));
                }
                WsEvent::Message(_) => {}
                WsEvent::Error(err) => {
                    self.conn = None;
                    return Some(TransportEvent::Error(classify_ws_error(&err)));
                }
                WsEvent::Closed => {
                    self.conn = None;
                    return Some(TransportEvent::Closed);
                }
            }
        }
    }

    fn close(&mut self) {
        self.inbox.clear();
        if let Some(mut conn) = self.conn.take() {
            debug!("closing hub connection to {}", self.url);
            conn.sender.close();
        }
    }
}

fn websocket_url(raw: &str) -> Result<Url, HubError> {
    let mut url = Url::parse(raw).map_err(|e| HubError::EndpointMisconfigured(format!("{raw}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HubError::EndpointMisconfigured(format!(
                "unsupported scheme '{other}' in {raw}"
            )))
        }
    };

    if url.set_scheme(scheme).is_err() {
        return Err(HubError::EndpointMisconfigured(raw.to_owned()));
    }

    Ok(url)
}

/// Upgrade failures only reach us as strings, e.g.
/// `Connect: HTTP error: 401 Unauthorized`.
fn classify_ws_error(err: &str) -> TransportError {
    const MARKER: &str = "HTTP error: ";

    let status = err.find(MARKER).and_then(|idx| {
        let rest = &err[idx + MARKER.len()..];
        rest.get(..3)?.parse::<u16>().ok()
    });

    match status {
        Some(status) => TransportError::Status {
            status,
            message: err.to_owned(),
        },
        None => TransportError::Io(err.to_owned()),
    }
}
