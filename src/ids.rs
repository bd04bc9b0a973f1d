//! Opaque byte-string identifiers.
//!
//! `MessageId` and `ChannelId` carry no structure the core cares about beyond
//! byte equality; non-emptiness is enforced at the construction boundary
//! (`wrapOutgoing`, `ReliabilityManager::new`), not here.

use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl From<&[u8]> for $name {
            fn from(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex_preview(&self.0))
            }
        }
    };
}

fn hex_preview(bytes: &[u8]) -> String {
    let take = bytes.len().min(8);
    let mut s = String::with_capacity(take * 2);
    for b in &bytes[..take] {
        s.push_str(&format!("{:02x}", b));
    }
    if bytes.len() > take {
        s.push('…');
    }
    s
}

opaque_id!(MessageId);
opaque_id!(ChannelId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_bytes() {
        assert_eq!(MessageId::new(vec![1, 2, 3]), MessageId::new(vec![1, 2, 3]));
        assert_ne!(MessageId::new(vec![1, 2, 3]), MessageId::new(vec![1, 2, 4]));
    }
}
