//! Liveness replies. Silent peers are not evicted on a timer; dead peers
//! surface through transport close or a timed-out write.

use stopguard_core::envelope::{Inbound, Outbound};

/// Reply owed to the sender for `inbound`, if it is a liveness check.
pub fn respond(inbound: &Inbound) -> Option<Outbound> {
    match inbound {
        Inbound::Ping => Some(Outbound::Pong),
        _ => None,
    }
}
