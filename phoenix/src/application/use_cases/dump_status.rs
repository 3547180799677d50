//! `dump-status` CLI command: a point-in-time snapshot of every processor's
//! resolved configuration.

use crate::presentation::render_status;
use phoenix_domain::repositories::ProcessorRegistry;

pub fn dump_status(registry: &dyn ProcessorRegistry) -> String {
    render_status(&registry.snapshot_all())
}
