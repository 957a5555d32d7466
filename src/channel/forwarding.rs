//! Client-side forwarding code for message-based channels
//!
//! There is no session on the client to push property changes back, so a
//! small script is attached to each synced property of the rendered view.
//! It buffers changes for the debounce window, merges them (last value per
//! property wins) and sends the flat result through the comm. If the kernel
//! does not answer within `timeout`, the buffer is unblocked and retried.

/// Parameters baked into one forwarding snippet
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingParams {
    pub comm_id: String,
    pub property: String,
    pub timeout_ms: u64,
    pub debounce_ms: u64,
    /// Reference id of the root view the property lives on
    pub plot_id: String,
}

const TEMPLATE: &str = r#"var data = {};
data[__PROPERTY__] = cb_obj[__PROPERTY__];
var registry = window.__viewsync_comms = window.__viewsync_comms || {};
var status = registry[__COMM_ID__];
if (status === undefined) {
  status = registry[__COMM_ID__] = {event_buffer: [], blocked: false, time: Date.now()};
}
status.event_buffer.push(data);
function flush_events() {
  var merged = {};
  status.event_buffer.forEach(function (evt) { Object.assign(merged, evt); });
  status.event_buffer = [];
  var comm = window.ViewSync.comm(__COMM_ID__, __PLOT_ID__);
  if (comm === undefined) { status.blocked = false; return; }
  comm.send(merged).then(function () { status.blocked = false; });
}
if (!status.blocked || (Date.now() - status.time) > __TIMEOUT__) {
  status.blocked = true;
  status.time = Date.now();
  setTimeout(flush_events, __DEBOUNCE__);
}"#;

const PLACEHOLDERS: [&str; 5] = [
    "__PROPERTY__",
    "__COMM_ID__",
    "__PLOT_ID__",
    "__TIMEOUT__",
    "__DEBOUNCE__",
];

/// Render the forwarding snippet for one property
///
/// The template is scanned once, so substituted values are never rescanned
/// for placeholders.
pub fn forwarding_code(params: &ForwardingParams) -> String {
    let mut code = String::with_capacity(TEMPLATE.len() + 128);
    let mut rest = TEMPLATE;

    while let Some(start) = rest.find("__") {
        let tail = &rest[start..];
        match PLACEHOLDERS.iter().find(|p| tail.starts_with(**p)) {
            Some(placeholder) => {
                code.push_str(&rest[..start]);
                code.push_str(&placeholder_value(placeholder, params));
                rest = &tail[placeholder.len()..];
            }
            None => {
                code.push_str(&rest[..start + 2]);
                rest = &tail[2..];
            }
        }
    }
    code.push_str(rest);
    code
}

fn placeholder_value(placeholder: &str, params: &ForwardingParams) -> String {
    match placeholder {
        "__PROPERTY__" => js_string(&params.property),
        "__COMM_ID__" => js_string(&params.comm_id),
        "__PLOT_ID__" => js_string(&params.plot_id),
        "__TIMEOUT__" => params.timeout_ms.to_string(),
        "__DEBOUNCE__" => params.debounce_ms.to_string(),
        _ => String::new(),
    }
}

/// Quote a string as a JS literal (JSON string syntax is valid JS)
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
