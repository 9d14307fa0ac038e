//! Persistence of histograms and distributions.
//!
//! Objects are written into a hierarchical container of [`Group`]s and
//! [`Dataset`]s. A group holding an object is tagged with a `repr`
//! attribute; reading dispatches on that tag through the closed
//! [`ObjectTag`] registry, so unknown tags are errors rather than guesses.
//!
//! # Example
//!
//! ```
//! use bayesgrid::persist::{File, Persist, Persisted};
//! use bayesgrid::Histogram1D;
//!
//! let mut h = Histogram1D::from_edges(&[0.0, 1.0, 2.0], None, 0.0).unwrap();
//! h.update(&[0.5, 1.5, 1.7], true, false).unwrap();
//!
//! let bytes = File::from_object(&h).to_bytes().unwrap();
//! let file = File::from_bytes(&bytes).unwrap();
//! match file.read_object().unwrap() {
//!     Persisted::Histogram1D(back) => assert_eq!(back, h),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod convert;
pub mod native;
pub mod schema;

use std::path::Path;

pub use native::{ContainerHeader, DeserializeError, Encoding, NativeCodec, ObjectTag, SerializeError};
pub use schema::{Attr, Data, Dataset, Group, Node, SchemaError};

use crate::distribution::{LogNormal, Normal};
use crate::histogram::Histogram1D;

// =============================================================================
// Persist trait and registry
// =============================================================================

/// An object that can be stored in a container group.
pub trait Persist: Sized {
    /// Registry tag; its [`repr`](ObjectTag::repr) is written to the group.
    const TAG: ObjectTag;

    /// Self-contained group describing this object.
    fn to_group(&self) -> Group;

    /// Rebuild the object from a group written by [`to_group`](Self::to_group).
    fn from_group(group: &Group) -> Result<Self, DeserializeError>;
}

/// Any object the registry knows how to read.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Histogram1D(Histogram1D),
    Normal(Normal),
    LogNormal(LogNormal),
}

/// Read whatever object `group` holds, dispatching on its `repr` tag.
pub fn read_object(group: &Group) -> Result<Persisted, DeserializeError> {
    let repr = group.repr().ok_or(DeserializeError::MissingRepr)?;
    match ObjectTag::from_repr(repr) {
        Some(ObjectTag::Histogram1D) => Ok(Persisted::Histogram1D(Histogram1D::from_group(group)?)),
        Some(ObjectTag::Normal) => Ok(Persisted::Normal(Normal::from_group(group)?)),
        Some(ObjectTag::LogNormal) => Ok(Persisted::LogNormal(LogNormal::from_group(group)?)),
        Some(ObjectTag::Group) | None => Err(DeserializeError::UnknownObject(repr.to_owned())),
    }
}

// =============================================================================
// File
// =============================================================================

/// A container: one root group plus the tag of the object it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    tag: ObjectTag,
    root: Group,
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}

impl File {
    /// Empty container whose root is a plain group.
    pub fn new() -> Self {
        Self {
            tag: ObjectTag::Group,
            root: Group::new(),
        }
    }

    /// Container around an existing root group.
    ///
    /// The tag follows the root's `repr` attribute, defaulting to a plain
    /// group.
    pub fn from_root(root: Group) -> Self {
        let tag = root
            .repr()
            .and_then(ObjectTag::from_repr)
            .unwrap_or(ObjectTag::Group);
        Self { tag, root }
    }

    /// Container holding a single object at its root.
    pub fn from_object<T: Persist>(object: &T) -> Self {
        Self {
            tag: T::TAG,
            root: object.to_group(),
        }
    }

    #[inline]
    pub fn tag(&self) -> ObjectTag {
        self.tag
    }

    #[inline]
    pub fn root(&self) -> &Group {
        &self.root
    }

    #[inline]
    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    /// Read the object stored at the root.
    pub fn read_object(&self) -> Result<Persisted, DeserializeError> {
        read_object(&self.root)
    }

    /// Read the root as a specific type.
    pub fn read<T: Persist>(&self) -> Result<T, DeserializeError> {
        if self.tag != T::TAG {
            return Err(DeserializeError::TypeMismatch {
                expected: T::TAG,
                actual: self.tag,
            });
        }
        T::from_group(&self.root)
    }

    /// Encode with the default Postcard codec.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        self.to_bytes_with(&NativeCodec::new())
    }

    pub fn to_bytes_with(&self, codec: &NativeCodec) -> Result<Vec<u8>, SerializeError> {
        let n_children = u32::try_from(self.root.len()).map_err(|_| SerializeError::TooLarge(self.root.len()))?;
        codec.serialize(self.tag, n_children, &self.root)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let (header, root): (ContainerHeader, Group) = NativeCodec::new().deserialize(bytes)?;
        if header.n_children as usize != root.len() {
            return Err(DeserializeError::CorruptPayload(format!(
                "header records {} children, payload has {}",
                header.n_children,
                root.len()
            )));
        }
        Ok(Self {
            tag: header.tag,
            root,
        })
    }

    /// Write the container to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SerializeError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        log::debug!("wrote {:?} container to {}", self.tag, path.as_ref().display());
        Ok(())
    }

    /// Read a container from `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeserializeError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::LogBase;

    #[test]
    fn registry_dispatches_on_repr() {
        let n = Normal::new(1.0, 2.0).unwrap();
        assert_eq!(read_object(&n.to_group()).unwrap(), Persisted::Normal(n));

        let unknown = Group::with_repr("Histogram2D");
        assert!(matches!(
            read_object(&unknown),
            Err(DeserializeError::UnknownObject(name)) if name == "Histogram2D"
        ));
        assert!(matches!(read_object(&Group::new()), Err(DeserializeError::MissingRepr)));
    }

    #[test]
    fn file_roundtrip_postcard_and_json() {
        let mut h = Histogram1D::from_edges(&[1.0, 10.0, 100.0], Some(LogBase::E), 0.0).unwrap();
        h.update(&[2.0, 50.0, 70.0], true, false).unwrap();
        let file = File::from_object(&h);

        let back = File::from_bytes(&file.to_bytes().unwrap()).unwrap();
        assert_eq!(back, file);
        assert_eq!(back.read::<Histogram1D>().unwrap(), h);

        let json = file.to_bytes_with(&NativeCodec::json()).unwrap();
        assert_eq!(File::from_bytes(&json).unwrap().read::<Histogram1D>().unwrap(), h);
    }

    #[test]
    fn read_checks_tag() {
        let file = File::from_object(&Normal::new(0.0, 1.0).unwrap());
        assert!(matches!(
            file.read::<LogNormal>(),
            Err(DeserializeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn nested_groups_in_a_file() {
        let mut file = File::new();
        let a = Histogram1D::from_edges(&[0.0, 1.0, 2.0], None, 0.0)
            .unwrap()
            .with_values(&[0.2, 1.2])
            .unwrap();
        file.root_mut().insert_group("conductivity", a.to_group());
        file.root_mut()
            .insert_group("noise", Normal::new(0.0, 0.1).unwrap().to_group());

        let back = File::from_bytes(&file.to_bytes().unwrap()).unwrap();
        assert_eq!(back.tag(), ObjectTag::Group);
        assert_eq!(
            read_object(back.root().group("conductivity").unwrap()).unwrap(),
            Persisted::Histogram1D(a)
        );
        assert!(back.read_object().is_err());
    }
}
