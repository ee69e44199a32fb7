//! Card archive codec.
//!
//! A card archive is a zip file with this layout:
//!
//! ```text
//! connection.json
//! metadata.json
//! credentials/<name>
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::{Cursor, Read, Write};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::model::{
    parse_document, CardModel, Credentials, CONNECTION_FILENAME, CREDENTIALS_DIRNAME,
    METADATA_FILENAME,
};
use idcard_common::{validate_entry_name, Error, Result};

/// Encoding of an encoded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveOutput {
    /// Raw zip bytes.
    #[default]
    Binary,
    /// Standard base64 text of the zip bytes.
    Base64,
}

/// Compression applied to archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

impl ArchiveCompression {
    fn method(self) -> CompressionMethod {
        match self {
            Self::Deflated => CompressionMethod::Deflated,
            Self::Stored => CompressionMethod::Stored,
        }
    }
}

/// Options for archive encoding.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Output encoding.
    pub output: ArchiveOutput,
    /// Entry compression.
    pub compression: ArchiveCompression,
}

impl ArchiveOptions {
    /// Create default options (binary output, deflate).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output encoding.
    pub fn with_output(mut self, output: ArchiveOutput) -> Self {
        self.output = output;
        self
    }

    /// Set entry compression.
    pub fn with_compression(mut self, compression: ArchiveCompression) -> Self {
        self.compression = compression;
        self
    }
}

/// Encoded card archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveData {
    Binary(Vec<u8>),
    Base64(String),
}

impl ArchiveData {
    /// Raw zip bytes, decoding base64 output if needed.
    ///
    /// # Errors
    /// - Base64 text is malformed
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Binary(bytes) => Ok(bytes),
            Self::Base64(text) => STANDARD
                .decode(text.trim())
                .map_err(|e| Error::archive("Invalid base64 card archive", e)),
        }
    }
}

impl From<Vec<u8>> for ArchiveData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for ArchiveData {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// Raw documents read out of an archive.
struct ArchiveContents {
    connection: String,
    metadata: String,
    credentials: Credentials,
}

/// Reads and writes cards as zip archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveCodec {
    options: ArchiveOptions,
}

impl ArchiveCodec {
    /// Create a codec with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with the given encoding options.
    pub fn with_options(options: ArchiveOptions) -> Self {
        Self { options }
    }

    /// Encoding options in use.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Load a card from archive data.
    ///
    /// # Errors
    /// - `MissingFile` if `connection.json` or `metadata.json` is absent
    /// - `Json` if either document is not valid JSON
    /// - `Archive` if the data is not a readable zip archive
    /// - Any card construction error
    pub async fn decode(&self, data: impl Into<ArchiveData>) -> Result<CardModel> {
        let bytes = data.into().into_bytes()?;
        debug!(size = bytes.len(), "Loading card archive");

        let contents = tokio::task::spawn_blocking(move || read_archive(bytes))
            .await
            .map_err(|e| Error::archive("Archive reader task failed", e))??;

        let connection = parse_document(CONNECTION_FILENAME, &contents.connection)?;
        let metadata = parse_document(METADATA_FILENAME, &contents.metadata)?;

        let mut card = CardModel::from_documents(metadata, connection)?;
        card.set_credentials(contents.credentials);

        info!(
            user = card.user_name(),
            credentials = card.credentials().len(),
            "Card loaded from archive"
        );
        Ok(card)
    }

    /// Write a card as archive data.
    ///
    /// An empty credential set produces no `credentials/` entries.
    ///
    /// # Errors
    /// - `InvalidInput` if a credential name is not a plain file name
    /// - `Archive` if the zip writer fails
    pub async fn encode(&self, card: &CardModel) -> Result<ArchiveData> {
        for name in card.credentials().keys() {
            validate_entry_name(name)?;
        }

        let connection = card.connection_json()?;
        let metadata = card.metadata_json()?;
        let credentials = card.credentials().clone();
        let method = self.options.compression.method();

        let bytes = tokio::task::spawn_blocking(move || {
            write_archive(&connection, &metadata, &credentials, method)
        })
        .await
        .map_err(|e| Error::archive("Archive writer task failed", e))??;

        debug!(
            user = card.user_name(),
            size = bytes.len(),
            "Card archive written"
        );

        Ok(match self.options.output {
            ArchiveOutput::Binary => ArchiveData::Binary(bytes),
            ArchiveOutput::Base64 => ArchiveData::Base64(STANDARD.encode(bytes)),
        })
    }
}

fn read_archive(bytes: Vec<u8>) -> Result<ArchiveContents> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::archive("Unable to open card archive", e))?;

    let connection = read_required(&mut archive, CONNECTION_FILENAME)?;
    let metadata = read_required(&mut archive, METADATA_FILENAME)?;

    // Only direct children of credentials/ are credentials.
    let prefix = format!("{}/", CREDENTIALS_DIRNAME);
    let mut credentials = Credentials::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::archive("Unable to read archive entry", e))?;
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let name = match entry_name.strip_prefix(&prefix) {
            Some(name) if !name.is_empty() && !name.contains('/') => name.to_string(),
            _ => continue,
        };
        if validate_entry_name(&name).is_err() {
            warn!(entry = %entry_name, "Skipping credential with unusable name");
            continue;
        }

        let content = read_text(&mut entry, &entry_name)?;
        credentials.insert(name, content);
    }

    Ok(ArchiveContents {
        connection,
        metadata,
        credentials,
    })
}

fn read_required<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String> {
    match archive.by_name(name) {
        Ok(mut entry) => read_text(&mut entry, name),
        Err(ZipError::FileNotFound) => Err(Error::MissingFile {
            file: name.to_string(),
            source: None,
        }),
        Err(e) => Err(Error::archive(format!("Unable to read {}", name), e)),
    }
}

fn read_text(reader: &mut impl Read, name: &str) -> Result<String> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| Error::archive(format!("Unable to read {}", name), e))?;
    String::from_utf8(data)
        .map_err(|e| Error::Serialization(format!("{} is not valid UTF-8: {}", name, e)))
}

fn file_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(method)
}

fn write_archive(
    connection: &str,
    metadata: &str,
    credentials: &Credentials,
    method: CompressionMethod,
) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    write_entry(&mut writer, CONNECTION_FILENAME, connection, method)?;
    write_entry(&mut writer, METADATA_FILENAME, metadata, method)?;

    if !credentials.is_empty() {
        writer
            .add_directory(format!("{}/", CREDENTIALS_DIRNAME), file_options(method))
            .map_err(|e| Error::archive("Unable to add credentials directory", e))?;
        for (name, content) in credentials {
            let entry_name = format!("{}/{}", CREDENTIALS_DIRNAME, name);
            write_entry(&mut writer, &entry_name, content, method)?;
        }
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::archive("Unable to finish card archive", e))?;
    Ok(cursor.into_inner())
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    content: &str,
    method: CompressionMethod,
) -> Result<()> {
    writer
        .start_file(name, file_options(method))
        .map_err(|e| Error::archive(format!("Unable to add {}", name), e))?;
    writer
        .write_all(content.as_bytes())
        .map_err(|e| Error::archive(format!("Unable to write {}", name), e))?;
    Ok(())
}
