//! Forwards proxy log lines into `tracing`

use durable_proxy_core::protocol::messages::LogRequest;

/// Emit a forwarded log line at the level the proxy asked for.
///
/// Proxy levels map as `Critical`/`SError`/`Error` → error, `Warn` → warn,
/// `Info` → info, `Debug` → debug; `None` is dropped and anything
/// unrecognised is logged at info.
pub(crate) fn forward(request: &LogRequest) {
    let message = request.log_message.as_deref().unwrap_or_default();
    let from_proxy = request.from_proxy.unwrap_or(true);
    let time = request
        .time
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    match request.log_level.as_deref().unwrap_or("Info") {
        "None" => {}
        "Critical" | "SError" | "Error" => {
            tracing::error!(target: "proxy", from_proxy, time = %time, "{}", message)
        }
        "Warn" => tracing::warn!(target: "proxy", from_proxy, time = %time, "{}", message),
        "Debug" => tracing::debug!(target: "proxy", from_proxy, time = %time, "{}", message),
        _ => tracing::info!(target: "proxy", from_proxy, time = %time, "{}", message),
    }
}
