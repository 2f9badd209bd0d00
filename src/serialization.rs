//! Serializing and deserializing the tokenizer model.

#[cfg(feature = "std")]
use std::fs::File;
#[cfg(feature = "std")]
use std::io::{Read, Result as IOResult, Write};

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::{Fastpiece, InitializationError, Model};

const MAGIC: &[u8] = b"fastpiece";
const VERSION: &[u8] = &[0, 0];

/// Errors encountered when deserializing a model.
#[non_exhaustive]
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum DeserializationError {
    /// The data is invalid. See the error message for more information.
    #[cfg_attr(feature = "std", error("{0}"))]
    InvalidData(String),
    /// The tokenizer failed to initialize.
    #[cfg_attr(feature = "std", error("{0}"))]
    InitializationError(InitializationError),
    /// Reading the data failed.
    #[cfg(feature = "std")]
    #[error("{0}")]
    IOError(#[from] std::io::Error),
}
impl From<InitializationError> for DeserializationError {
    fn from(e: InitializationError) -> Self {
        Self::InitializationError(e)
    }
}

impl Model {
    /// Deserializes a model from a reader.
    #[cfg(feature = "std")]
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DeserializationError> {
        let magic = {
            let mut magic = [0; MAGIC.len()];
            reader.read_exact(&mut magic)?;
            magic
        };
        if magic != MAGIC {
            return Err(DeserializationError::InvalidData("invalid magic".to_string()));
        }
        let version = {
            let mut version = [0; VERSION.len()];
            reader.read_exact(&mut version)?;
            version
        };
        if version != VERSION {
            return Err(DeserializationError::InvalidData("invalid version".to_string()));
        }
        let data = {
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            data
        };
        let model = postcard::from_bytes(&data)
            .map_err(|e| DeserializationError::InvalidData(e.to_string()))?;
        Ok(model)
    }

    /// Deserializes a model from a file.
    #[cfg(feature = "std")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DeserializationError> {
        let mut file = File::open(path)?;
        Self::from_reader(&mut file)
    }

    /// Deserializes a model from bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, DeserializationError> {
        if slice.len() < MAGIC.len() + VERSION.len() {
            return Err(DeserializationError::InvalidData("invalid size".to_string()));
        }
        if &slice[..MAGIC.len()] != MAGIC {
            return Err(DeserializationError::InvalidData("invalid magic".to_string()));
        }
        if &slice[MAGIC.len()..MAGIC.len() + VERSION.len()] != VERSION {
            return Err(DeserializationError::InvalidData("invalid version".to_string()));
        }
        let model = postcard::from_bytes(&slice[MAGIC.len() + VERSION.len()..])
            .map_err(|e| DeserializationError::InvalidData(e.to_string()))?;
        Ok(model)
    }

    /// Serializes the model to a writer.
    #[cfg(feature = "std")]
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> IOResult<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(VERSION)?;
        let data = postcard::to_allocvec(self).unwrap();
        writer.write_all(&data)?;
        Ok(())
    }

    /// Serializes the model to a file.
    #[cfg(feature = "std")]
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> IOResult<()> {
        let mut file = File::create(path)?;
        self.to_writer(&mut file)
    }

    /// Serializes the model to bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        let data = postcard::to_allocvec(self).unwrap();
        let mut vec = Vec::with_capacity(MAGIC.len() + VERSION.len() + data.len());
        vec.extend_from_slice(MAGIC);
        vec.extend_from_slice(VERSION);
        vec.extend_from_slice(&data);
        vec
    }
}

impl Fastpiece {
    /// Deserializes a model from a reader and initializes the tokenizer.
    /// See [`Fastpiece::new`] for more details.
    #[cfg(feature = "std")]
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DeserializationError> {
        let model = Model::from_reader(reader)?;
        Ok(Self::new(model)?)
    }

    /// Deserializes a model from a file and initializes the tokenizer.
    /// See [`Fastpiece::new`] for more details.
    #[cfg(feature = "std")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DeserializationError> {
        let model = Model::from_file(path)?;
        Ok(Self::new(model)?)
    }

    /// Deserializes a model from bytes and initializes the tokenizer.
    /// See [`Fastpiece::new`] for more details.
    pub fn from_slice(slice: &[u8]) -> Result<Self, DeserializationError> {
        let model = Model::from_slice(slice)?;
        Ok(Self::new(model)?)
    }

    /// Serializes the model of this tokenizer to a writer.
    #[cfg(feature = "std")]
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> IOResult<()> {
        self.model().to_writer(writer)
    }

    /// Serializes the model of this tokenizer to a file.
    #[cfg(feature = "std")]
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> IOResult<()> {
        self.model().to_file(path)
    }

    /// Serializes the model of this tokenizer to bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.model().to_vec()
    }
}
