//! Connection handler metrics.

use metrics::{counter, gauge};

const ACTIVE_CONNECTIONS: &str = "scribe_web_active_connections";
const REQUESTS_TOTAL: &str = "scribe_web_requests_total";

pub(crate) fn connection_opened() {
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub(crate) fn connection_closed() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

pub(crate) fn request_finished(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}
