use async_zip::base::read::seek::ZipFileReader;
use async_zip::base::write::ZipFileWriter;
use async_zip::error::ZipError;
use async_zip::{Compression, ZipEntryBuilder};
use futures::io::Cursor;

/// Packs `(relative path, contents)` pairs into an in-memory deflate zip.
pub async fn zip_bytes(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, ZipError> {
    let mut writer = ZipFileWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let entry = ZipEntryBuilder::new(name.into(), Compression::Deflate);
        writer.write_entry_whole(entry, &data).await?;
    }
    let cursor = writer.close().await?;
    Ok(cursor.into_inner())
}

/// Unpacks an in-memory zip into `(relative path, contents)` pairs,
/// skipping directory entries.
pub async fn unzip_bytes(data: Vec<u8>) -> Result<Vec<(String, Vec<u8>)>, ZipError> {
    let mut reader = ZipFileReader::new(Cursor::new(data)).await?;
    let mut result = Vec::new();

    for index in 0..reader.file().entries().len() {
        let entry = &reader.file().entries()[index];
        let name = entry.filename().as_str()?.to_string();
        if entry.dir()? {
            continue;
        }

        let mut entry_reader = reader.reader_with_entry(index).await?;
        let mut contents = Vec::new();
        entry_reader.read_to_end_checked(&mut contents).await?;
        result.push((name, contents));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::*;
    use assert2::check;

    #[test]
    async fn zip_round_trip() {
        let entries = vec![
            ("metadata.json".to_string(), b"{\"Type\":\"ndb\"}".to_vec()),
            ("model/weights.bin".to_string(), vec![0u8; 1024]),
        ];

        let archive = zip_bytes(entries.clone()).await.unwrap();
        let mut unpacked = unzip_bytes(archive).await.unwrap();
        unpacked.sort_by(|a, b| a.0.cmp(&b.0));

        let mut expected = entries;
        expected.sort_by(|a, b| a.0.cmp(&b.0));

        check!(unpacked == expected);
    }
}
