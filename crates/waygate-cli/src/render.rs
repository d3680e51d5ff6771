//! Text rendering of the connection view.

use std::fmt::Write as _;

use waygate_core::{ConnectionRecord, ConnectionView, format_hms};

/// `Connected for HH:MM:SS`, or `None` unless connected.
pub fn timer_line(record: &ConnectionRecord, now_ms: u64) -> Option<String> {
    record.is_connected().then(|| format!("Connected for {}", format_hms(record.elapsed_ms(now_ms))))
}

/// Full status block, one field per line.
pub fn render(view: &ConnectionView, now_ms: u64) -> String {
    let record = &view.record;
    let mut out = format!("Status: {}", record.status.label());
    if let Some(operation) = view.in_flight {
        let _ = write!(out, " ({operation} in progress)");
    }
    if let Some(server) = &record.server_name {
        let _ = write!(out, "\nServer: {server}");
    }
    if let Some(tunnel) = &record.tunnel_id {
        let _ = write!(out, "\nTunnel: {tunnel}");
    }
    if let Some(timer) = timer_line(record, now_ms) {
        let _ = write!(out, "\n{timer}");
    }
    if let Some(err) = record.last_error.as_ref().filter(|_| record.has_error()) {
        let _ = write!(out, "\nError: {err}");
    }
    out
}
