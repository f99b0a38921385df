//! Reading and writing serializable artifacts (model documents, attribute
//! trees, import rows, template registries) from any source.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Cursor, Write},
    path::Path,
};

use crate::error::Error;

/// A trait for artifacts that can be parsed from and written to one stream.
///
/// Only `from_reader` and `to_writer` are required; files, strings and byte
/// slices are layered on top.
///
/// # Example
///
/// ```rust,no_run
/// use locmodel::{document::ModelDocument, traits::Parser};
/// let document = ModelDocument::read_from("Strings.model.json")?;
/// document.write_to("Strings.copy.json")?;
/// Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub trait Parser {
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error>
    where
        Self: Sized;

    fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, Error>
    where
        Self: Sized,
    {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error>;

    fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Serialized form held in memory.
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::new();
        self.to_writer(&mut buffer)?;
        Ok(buffer)
    }

    fn from_str(s: &str) -> Result<Self, Error>
    where
        Self: Sized,
    {
        Self::from_reader(Cursor::new(s))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error>
    where
        Self: Sized,
    {
        Self::from_reader(Cursor::new(bytes))
    }
}
