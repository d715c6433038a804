//! The narrow last-heard bookkeeping interface this core calls into
//! (§6.3). Persistence is an external collaborator's concern.

use crate::callsign::Callsign;

pub trait HeardSink: Send + Sync {
    fn heard(&self, my: &Callsign, rpt1: &Callsign, rpt2: &Callsign, via: Option<&Callsign>);
}

/// Discards every call. The default sink until a real one is composed in.
pub struct NullHeardSink;

impl HeardSink for NullHeardSink {
    fn heard(&self, my: &Callsign, rpt1: &Callsign, rpt2: &Callsign, via: Option<&Callsign>) {
        tracing::trace!(%my, %rpt1, %rpt2, via = ?via.map(|c| c.to_string()), "last-heard record discarded (no sink configured)");
    }
}
