//! XDG desktop portal hotkey provider
//!
//! Talks to `org.freedesktop.portal.GlobalShortcuts` on the session bus:
//!
//! 1. `CreateSession`, then wait for `org.freedesktop.portal.Request.Response`
//!    on the request object to learn the session handle
//! 2. `BindShortcuts` with every registered hotkey as a preferred trigger,
//!    again waiting for the request's `Response`; a denied bind fails start
//! 3. listen for `Activated` signals on that session
//!
//! Every signal subscription is restricted to the portal's unique bus name so
//! other peers on the session bus cannot fake responses or activations.
//!
//! The compositor owns the actual key grab, so this works inside Flatpak and
//! needs no device permissions. It cannot read raw keys, so capture-once is
//! not available here.

use super::keys;
use super::{dispatch, HotkeyCallback, HotkeyProvider};
use crate::error::HotkeyError;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use zbus::message::Type as MessageType;
use zbus::zvariant::{DynamicType, ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, MatchRule, MessageStream};

const PORTAL_BUS_NAME: &str = "org.freedesktop.portal.Desktop";
const PORTAL_OBJECT_PATH: &str = "/org/freedesktop/portal/desktop";
const GLOBAL_SHORTCUTS_INTERFACE: &str = "org.freedesktop.portal.GlobalShortcuts";
const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";
const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
const DBUS_BUS_NAME: &str = "org.freedesktop.DBus";
const DBUS_OBJECT_PATH: &str = "/org/freedesktop/DBus";

/// How long to wait for the portal to answer a request
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for the `is_supported` probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// How long `stop()` waits for the signal listener
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Desktop portal GlobalShortcuts provider
pub struct PortalProvider {
    hotkeys: Arc<RwLock<HashMap<String, HotkeyCallback>>>,
    connection: Option<Connection>,
    session: Option<OwnedObjectPath>,
    stop_signal: Option<watch::Sender<bool>>,
    listener: Option<JoinHandle<()>>,
}

impl Default for PortalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalProvider {
    pub fn new() -> Self {
        Self {
            hotkeys: Arc::new(RwLock::new(HashMap::new())),
            connection: None,
            session: None,
            stop_signal: None,
            listener: None,
        }
    }

    /// The session handle of the running session
    pub fn session(&self) -> Option<&OwnedObjectPath> {
        self.session.as_ref()
    }

    async fn create_session(
        &self,
        conn: &Connection,
        portal: &str,
    ) -> Result<OwnedObjectPath, HotkeyError> {
        let handle_token = next_token("req");
        let session_token = next_token("session");

        let options: HashMap<&str, Value<'_>> = HashMap::from([
            ("handle_token", Value::from(handle_token.as_str())),
            ("session_handle_token", Value::from(session_token.as_str())),
        ]);

        let results = portal_request(conn, portal, &handle_token, "CreateSession", &(options,))
            .await?;
        let session = session_handle(&results)?;

        tracing::debug!("Portal session created: {}", session.as_str());
        Ok(session)
    }

    async fn bind_shortcuts(
        &self,
        conn: &Connection,
        portal: &str,
        session: &OwnedObjectPath,
    ) -> Result<(), HotkeyError> {
        let ids: Vec<String> = self
            .hotkeys
            .read()
            .map(|h| h.keys().cloned().collect())
            .map_err(|_| HotkeyError::Protocol("hotkey table lock poisoned".into()))?;

        let shortcuts: Vec<(String, HashMap<&str, Value<'_>>)> = ids
            .iter()
            .map(|id| {
                let options = HashMap::from([
                    ("description", Value::from(format!("dictkey: {}", id))),
                    ("preferred_trigger", Value::from(to_accelerator(id))),
                ]);
                (id.clone(), options)
            })
            .collect();

        let handle_token = next_token("bind");
        let options: HashMap<&str, Value<'_>> =
            HashMap::from([("handle_token", Value::from(handle_token.as_str()))]);

        portal_request(
            conn,
            portal,
            &handle_token,
            "BindShortcuts",
            &(session.clone(), shortcuts, "", options),
        )
        .await?;

        tracing::debug!("Portal bound {} shortcut(s)", ids.len());
        Ok(())
    }
}

#[async_trait::async_trait]
impl HotkeyProvider for PortalProvider {
    fn name(&self) -> &'static str {
        "dbus"
    }

    async fn is_supported(&self) -> bool {
        match tokio::time::timeout(PROBE_TIMEOUT, probe_global_shortcuts()).await {
            Ok(Ok(supported)) => supported,
            Ok(Err(e)) => {
                tracing::debug!("Portal probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("Portal probe timed out after {:?}", PROBE_TIMEOUT);
                false
            }
        }
    }

    async fn start(&mut self) -> Result<(), HotkeyError> {
        if self.stop_signal.is_some() {
            return Err(HotkeyError::AlreadyStarted);
        }

        let conn = Connection::session().await?;
        let portal = portal_owner(&conn).await?;
        let session = self.create_session(&conn, &portal).await?;
        self.bind_shortcuts(&conn, &portal, &session).await?;

        let rule = signal_rule(
            &portal,
            GLOBAL_SHORTCUTS_INTERFACE,
            "Activated",
            PORTAL_OBJECT_PATH,
        )?;
        let activations = MessageStream::for_match_rule(rule, &conn, None).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        self.listener = Some(tokio::spawn(listen(
            activations,
            session.clone(),
            Arc::clone(&self.hotkeys),
            stop_rx,
        )));
        self.stop_signal = Some(stop_tx);
        self.connection = Some(conn);
        self.session = Some(session);

        tracing::info!("Desktop portal global shortcuts active");
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(stop) = self.stop_signal.take() else {
            return;
        };

        let _ = stop.send(true);
        drop(stop);
        // Dropping the last handle closes the bus connection
        self.connection = None;
        self.session = None;

        if let Some(listener) = self.listener.take() {
            if tokio::time::timeout(STOP_TIMEOUT, listener).await.is_err() {
                tracing::warn!("Portal listener did not exit within {:?}", STOP_TIMEOUT);
            }
        }
        tracing::debug!("Desktop portal provider stopped");
    }

    fn register_hotkey(
        &mut self,
        hotkey: &str,
        callback: HotkeyCallback,
    ) -> Result<(), HotkeyError> {
        let id = keys::normalize_hotkey(hotkey);
        if id.is_empty() {
            return Err(HotkeyError::UnknownKey(hotkey.to_string()));
        }

        let mut hotkeys = self
            .hotkeys
            .write()
            .map_err(|_| HotkeyError::Protocol("hotkey table lock poisoned".into()))?;
        if hotkeys.contains_key(&id) {
            return Err(HotkeyError::AlreadyRegistered(id));
        }

        if self.stop_signal.is_some() {
            tracing::warn!("Hotkey '{}' registered while running; it is bound on next start", id);
        }
        hotkeys.insert(id, callback);
        Ok(())
    }

    async fn capture_once(&self, _timeout: Duration) -> Result<String, HotkeyError> {
        Err(HotkeyError::CaptureNotSupported("dbus"))
    }

    fn supports_capture_once(&self) -> bool {
        false
    }

    fn is_listening(&self) -> bool {
        self.stop_signal.is_some()
    }
}

/// Convert a hotkey string to the portal's accelerator syntax
///
/// `ctrl+shift+a` becomes `<Ctrl><Shift>a`; `altgr+comma` becomes `<AltGr>comma`.
pub fn to_accelerator(hotkey: &str) -> String {
    let combo = keys::parse_hotkey(hotkey);
    let mut accel = String::new();

    for modifier in &combo.modifiers {
        let name = match modifier.as_str() {
            "ctrl" | "control" | "leftctrl" | "rightctrl" => "Ctrl",
            "shift" | "leftshift" | "rightshift" => "Shift",
            "alt" | "leftalt" => "Alt",
            "altgr" | "rightalt" => "AltGr",
            "super" | "meta" | "win" | "leftmeta" | "rightmeta" => "Super",
            "hyper" => "Hyper",
            other => other,
        };
        accel.push('<');
        accel.push_str(name);
        accel.push('>');
    }

    let key = match combo.key.as_str() {
        "enter" => "Return".to_string(),
        "tab" => "Tab".to_string(),
        "escape" => "Escape".to_string(),
        "backspace" => "BackSpace".to_string(),
        "delete" => "Delete".to_string(),
        "comma" => "comma".to_string(),
        "period" => "period".to_string(),
        "space" => "space".to_string(),
        f if is_function_key(f) => f.to_uppercase(),
        other => other.to_string(),
    };
    accel.push_str(&key);
    accel
}

fn is_function_key(key: &str) -> bool {
    key.strip_prefix('f')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=24).contains(&n))
}

/// A handle token unique within this process
fn next_token(kind: &str) -> String {
    format!(
        "dictkey_{}_{}_{}",
        kind,
        std::process::id(),
        TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Unique bus name currently owning the portal service
///
/// Signals carry the sender's unique name, so subscriptions match on this
/// rather than on the well-known name.
async fn portal_owner(conn: &Connection) -> Result<String, HotkeyError> {
    let reply = conn
        .call_method(
            Some(DBUS_BUS_NAME),
            DBUS_OBJECT_PATH,
            Some(DBUS_BUS_NAME),
            "GetNameOwner",
            &(PORTAL_BUS_NAME,),
        )
        .await?;
    Ok(reply.body().deserialize()?)
}

/// Call a portal method that answers through a `Request` object
///
/// Subscribes to the predicted request path before calling so a fast
/// `Response` cannot be missed, then re-subscribes if the portal picked a
/// different path. Returns the response results on success.
async fn portal_request<B>(
    conn: &Connection,
    portal: &str,
    handle_token: &str,
    method: &str,
    body: &B,
) -> Result<HashMap<String, OwnedValue>, HotkeyError>
where
    B: serde::Serialize + DynamicType,
{
    let unique = conn
        .unique_name()
        .ok_or_else(|| HotkeyError::Protocol("session bus gave no unique name".into()))?
        .to_string();
    let expected = request_path(&unique, handle_token)?;
    let mut responses = response_stream(conn, portal, &expected).await?;

    let reply = conn
        .call_method(
            Some(PORTAL_BUS_NAME),
            PORTAL_OBJECT_PATH,
            Some(GLOBAL_SHORTCUTS_INTERFACE),
            method,
            body,
        )
        .await?;
    let request: OwnedObjectPath = reply.body().deserialize()?;

    // Old portals ignore handle_token and pick their own path
    if request.as_str() != expected.as_str() {
        tracing::debug!(
            "{} request path {} differs from expected {}",
            method,
            request.as_str(),
            expected.as_str()
        );
        responses = response_stream(conn, portal, &request).await?;
    }

    wait_for_response(&mut responses)
        .await
        .map_err(|e| match e {
            HotkeyError::Protocol(reason) => {
                HotkeyError::Protocol(format!("{}: {}", method, reason))
            }
            other => other,
        })
}

/// The request object path the portal will use for `token`
///
/// The sender part is the caller's unique name without the leading `:` and
/// with every `.` replaced by `_`.
fn request_path(unique_name: &str, token: &str) -> Result<OwnedObjectPath, HotkeyError> {
    let sender = unique_name.trim_start_matches(':').replace('.', "_");
    let path = format!("{}/request/{}/{}", PORTAL_OBJECT_PATH, sender, token);

    ObjectPath::try_from(path)
        .map(OwnedObjectPath::from)
        .map_err(|e| HotkeyError::Protocol(format!("bad request path: {}", e)))
}

/// Match rule for one signal sent by `sender` on `path`
fn signal_rule<'a>(
    sender: &'a str,
    interface: &'a str,
    member: &'a str,
    path: &'a str,
) -> Result<MatchRule<'a>, HotkeyError> {
    Ok(MatchRule::builder()
        .msg_type(MessageType::Signal)
        .sender(sender)?
        .interface(interface)?
        .member(member)?
        .path(path)?
        .build())
}

async fn response_stream(
    conn: &Connection,
    portal: &str,
    request: &OwnedObjectPath,
) -> Result<MessageStream, HotkeyError> {
    let rule = signal_rule(portal, REQUEST_INTERFACE, "Response", request.as_str())?;
    Ok(MessageStream::for_match_rule(rule, conn, Some(1)).await?)
}

/// Wait for a Request.Response and return its results on success
async fn wait_for_response(
    responses: &mut MessageStream,
) -> Result<HashMap<String, OwnedValue>, HotkeyError> {
    let message = tokio::time::timeout(RESPONSE_TIMEOUT, responses.next())
        .await
        .map_err(|_| {
            HotkeyError::Protocol(format!("no portal response within {:?}", RESPONSE_TIMEOUT))
        })?
        .ok_or_else(|| HotkeyError::Protocol("bus closed while waiting for response".into()))??;

    let (code, results): (u32, HashMap<String, OwnedValue>) = message.body().deserialize()?;
    response_result(code, results)
}

/// Map a Request.Response code to its results or an error
///
/// 0 is success, 1 means the user cancelled the dialog, anything else is a
/// failure on the portal side.
fn response_result(
    code: u32,
    results: HashMap<String, OwnedValue>,
) -> Result<HashMap<String, OwnedValue>, HotkeyError> {
    match code {
        0 => Ok(results),
        1 => Err(HotkeyError::Protocol("request cancelled by the user".into())),
        other => Err(HotkeyError::Protocol(format!(
            "request failed with response code {}",
            other
        ))),
    }
}

/// Session handle from a CreateSession response
fn session_handle(results: &HashMap<String, OwnedValue>) -> Result<OwnedObjectPath, HotkeyError> {
    let handle = results
        .get("session_handle")
        .and_then(value_to_string)
        .ok_or_else(|| {
            HotkeyError::Protocol("CreateSession response has no session_handle".into())
        })?;

    ObjectPath::try_from(handle.clone())
        .map(OwnedObjectPath::from)
        .map_err(|e| HotkeyError::Protocol(format!("bad session handle '{}': {}", handle, e)))
}

/// `session_handle` is documented as a string but some portals send an object path
fn value_to_string(value: &OwnedValue) -> Option<String> {
    match &**value {
        Value::Str(s) => Some(s.to_string()),
        Value::ObjectPath(p) => Some(p.to_string()),
        _ => None,
    }
}

/// Body of a GlobalShortcuts `Activated` signal
type Activated = (OwnedObjectPath, String, u64, HashMap<String, OwnedValue>);

/// The shortcut id of an activation, if it belongs to `session`
fn activated_shortcut(session: &OwnedObjectPath, activated: Activated) -> Option<String> {
    let (activated_session, shortcut_id, _timestamp, _options) = activated;
    (activated_session.as_str() == session.as_str()).then_some(shortcut_id)
}

async fn probe_global_shortcuts() -> Result<bool, HotkeyError> {
    let conn = Connection::session().await?;
    let reply = conn
        .call_method(
            Some(PORTAL_BUS_NAME),
            PORTAL_OBJECT_PATH,
            Some(INTROSPECTABLE_INTERFACE),
            "Introspect",
            &(),
        )
        .await?;
    let xml: String = reply.body().deserialize()?;
    Ok(xml.contains(GLOBAL_SHORTCUTS_INTERFACE))
}

/// Dispatch `Activated` signals for our session until told to stop
async fn listen(
    mut activations: MessageStream,
    session: OwnedObjectPath,
    hotkeys: Arc<RwLock<HashMap<String, HotkeyCallback>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = stop_rx.changed() => {
                tracing::debug!("Portal listener stopping");
                return;
            }
            message = activations.next() => match message {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::warn!("Portal signal error: {}", e);
                    continue;
                }
                None => {
                    tracing::debug!("Portal signal stream closed");
                    return;
                }
            }
        };

        let activated: Activated = match message.body().deserialize() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Malformed Activated signal: {}", e);
                continue;
            }
        };
        let Some(shortcut_id) = activated_shortcut(&session, activated) else {
            continue;
        };

        let callback = hotkeys
            .read()
            .ok()
            .and_then(|h| h.get(&shortcut_id).cloned());
        match callback {
            Some(callback) => {
                tracing::debug!("Portal shortcut activated: {}", shortcut_id);
                dispatch(&shortcut_id, callback);
            }
            None => tracing::debug!("Activation for unknown shortcut '{}'", shortcut_id),
        }
    }
}
