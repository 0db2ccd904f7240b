//! The CSV file listing every saved image together with its caption.

use std::io;

pub const MANIFEST_HEADER: [&str; 3] = ["sno", "image_path", "caption"];

/// One row of the manifest
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// 1-based position of the row in the manifest
    pub sno: u64,
    pub image_path: String,
    pub caption: String,
}

pub fn read_from(reader: impl io::Read) -> csv::Result<Vec<Record>> {
    csv::Reader::from_reader(reader).deserialize().collect()
}

/// Writes the header and then all records. The header is written even if there are no
/// records.
pub fn write_to(writer: impl io::Write, records: &[Record]) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(MANIFEST_HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
