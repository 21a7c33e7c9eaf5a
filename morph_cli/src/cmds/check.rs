/* Check command - compile every record of a schema in both directions */

use super::common::load_codec;
use morph_codec::{Codec, CodecError};
use std::path::Path;
use tracing::debug;

/// Outcome of compiling one record.
#[derive(Debug)]
pub struct RecordCheck {
    pub record: String,
    pub result: Result<(), CodecError>,
}

/// Compiles the decoder and encoder of every record, in name order.
/// Routines stay cached on `codec` afterwards.
pub fn check_codec(codec: &Codec) -> Vec<RecordCheck> {
    let mut names: Vec<String> = codec.schema().records().map(|r| r.name.clone()).collect();
    names.sort();
    names
        .into_iter()
        .map(|record| {
            debug!(record = %record, "compiling");
            let result = codec
                .decoder(&record)
                .and_then(|_| codec.encoder(&record))
                .map(|_| ());
            RecordCheck { record, result }
        })
        .collect()
}

pub fn run(schema: &Path) -> anyhow::Result<()> {
    let codec = load_codec(schema)?;
    let checks = check_codec(&codec);

    let mut failed = 0;
    for check in &checks {
        match &check.result {
            Ok(()) => println!("[ok]   {}", check.record),
            Err(err) => {
                failed += 1;
                println!("[fail] {}: {}", check.record, err);
            }
        }
    }
    println!(
        "{} records, {} failed, {} routines compiled",
        checks.len(),
        failed,
        codec.cached_routines()
    );

    if failed > 0 {
        anyhow::bail!("{failed} of {} records failed to compile", checks.len());
    }
    Ok(())
}
