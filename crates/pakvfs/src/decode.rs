//! Object-decode pipeline types.
//!
//! A container turns raw entry bytes into typed objects through a
//! [`DecoderBinding`] chosen by the externally supplied [`ObjectFactory`].
//! The binding is resolved once per entry and cached on it.

use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::ops::BitOr;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::archive::BinaryArchive;
use crate::entry::FileEntry;
use crate::error::BoxError;
use crate::game::GameDescriptor;

/// Option bits threaded through data and object loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileOption(u32);

impl FileOption {
    pub const DEFAULT: Self = Self(0);
    /// Stored bytes, skipping decompression where the codec allows it
    pub const RAW: Self = Self(0x1);
    /// Object loads skip the decoder and yield the entry bytes
    pub const STREAM: Self = Self(0x2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileOption {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Type-erased result of a decoder.
///
/// A decoder may return a [redirect](Self::redirect) to an object it did not
/// decode itself; typed access looks through one level of redirect.
#[derive(Clone)]
pub struct DecodedObject {
    inner: Decoded,
}

#[derive(Clone)]
enum Decoded {
    Value {
        value: Arc<dyn Any + Send + Sync>,
        type_name: &'static str,
    },
    Redirect(Box<DecodedObject>),
}

impl DecodedObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: Decoded::Value {
                value,
                type_name: type_name::<T>(),
            },
        }
    }

    /// Point at an object decoded elsewhere.
    pub fn redirect(target: Self) -> Self {
        Self {
            inner: Decoded::Redirect(Box::new(target)),
        }
    }

    pub const fn is_redirect(&self) -> bool {
        matches!(self.inner, Decoded::Redirect(_))
    }

    /// Runtime type name of the value, looking through redirects.
    pub fn type_name(&self) -> &'static str {
        match &self.inner {
            Decoded::Value { type_name: name, .. } => *name,
            Decoded::Redirect(target) => target.type_name(),
        }
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        match &self.inner {
            Decoded::Value { value, .. } => value.is::<T>(),
            Decoded::Redirect(target) => matches!(
                &target.inner,
                Decoded::Value { value, .. } if value.is::<T>()
            ),
        }
    }

    /// Typed access. Unwraps at most one redirect; on mismatch the object is
    /// handed back unchanged.
    pub fn downcast<T: Any + Send + Sync>(self) -> Result<Arc<T>, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        let value = match self.inner {
            Decoded::Value { value, .. } => value,
            Decoded::Redirect(target) => match target.inner {
                Decoded::Value { value, .. } => value,
                inner @ Decoded::Redirect(_) => return Err(Self::redirect(Self { inner })),
            },
        };
        value.downcast::<T>().map_err(|value| Self {
            inner: Decoded::Value {
                value,
                type_name: "unknown",
            },
        })
    }
}

impl fmt::Debug for DecodedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedObject")
            .field("type", &self.type_name())
            .field("redirect", &self.is_redirect())
            .finish()
    }
}

/// Everything a decoder gets for one invocation.
pub struct DecodeContext {
    /// Fresh reader over the entry bytes; the decoder may keep it
    pub reader: Cursor<Bytes>,
    pub entry: Arc<FileEntry>,
    /// Container the entry was read from
    pub archive: Arc<BinaryArchive>,
    /// Binding option combined with the caller's
    pub option: FileOption,
}

/// Future returned by a decoder.
pub type DecodeFuture = BoxFuture<'static, Result<DecodedObject, BoxError>>;

/// Decoder function bound to an entry.
pub type DecodeFn = Arc<dyn Fn(DecodeContext) -> DecodeFuture + Send + Sync>;

/// The `(option, decoder)` pair cached on an entry.
#[derive(Clone)]
pub struct DecoderBinding {
    pub option: FileOption,
    pub decode: DecodeFn,
}

impl DecoderBinding {
    /// Bind an async decoder.
    pub fn new<F, Fut>(option: FileOption, decode: F) -> Self
    where
        F: Fn(DecodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DecodedObject, BoxError>> + Send + 'static,
    {
        Self {
            option,
            decode: Arc::new(move |ctx: DecodeContext| -> DecodeFuture { Box::pin(decode(ctx)) }),
        }
    }

    /// Bind a decoder that completes without awaiting.
    pub fn sync<F>(option: FileOption, decode: F) -> Self
    where
        F: Fn(DecodeContext) -> Result<DecodedObject, BoxError> + Send + Sync + 'static,
    {
        Self {
            option,
            decode: Arc::new(move |ctx: DecodeContext| -> DecodeFuture {
                Box::pin(futures::future::ready(decode(ctx)))
            }),
        }
    }
}

impl fmt::Debug for DecoderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderBinding")
            .field("option", &self.option)
            .finish_non_exhaustive()
    }
}

/// Chooses the decoder for an entry; `None` means raw bytes only.
pub type ObjectFactory =
    Arc<dyn Fn(&FileEntry, &dyn GameDescriptor) -> Option<DecoderBinding> + Send + Sync>;
