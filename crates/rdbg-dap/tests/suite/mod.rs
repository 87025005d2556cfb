mod fake_adapter;
mod session;

use rdbg_trace::record::Location;
use rdbg_trace::LogRecord;

/// Records `0..depths.len()` with the given depths; every record is a call.
pub(crate) fn history(depths: &[u32]) -> Vec<LogRecord> {
    depths
        .iter()
        .enumerate()
        .map(|(index, &depth)| {
            LogRecord::new(index as u64, depth, Location::new("/app/main.rb", index as u32 + 1))
                .with_name(format!("Main#step{index}"))
        })
        .collect()
}
