use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::{convert::TryFrom, fmt, ops::Deref, str::FromStr, sync::Arc};

use crate::error::ParseError;

fn is_valid_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

macro_rules! id_newtype {
    ($name:ident, $what:literal) => {
        #[doc = concat!("A validated, interned-by-reference ", $what, " identifier.")]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Result<Self, ParseError> {
                let value = value.as_ref();
                if is_valid_id(value) {
                    Ok(Self(Arc::from(value)))
                } else {
                    Err(ParseError::invalid_id($what, value))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ParseError;
            fn try_from(value: &str) -> Result<Self, ParseError> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;
            fn from_str(s: &str) -> Result<Self, ParseError> {
                Self::new(s)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                Self::new(&s).map_err(D::Error::custom)
            }
        }
    };
}

id_newtype!(DataItemId, "data item");
id_newtype!(DeviceId, "device");

/// A field token's optional `device_id:data_item_id` prefix, resolved by the token mapper
/// against the (external) device model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataItemRef {
    pub device: Option<DeviceId>,
    pub data_item: DataItemId,
}

impl DataItemRef {
    /// Parses `"device:item"` or bare `"item"` out of the first sub-token of a field.
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        match token.split_once(':') {
            Some((device, item)) => Ok(Self {
                device: Some(DeviceId::new(device)?),
                data_item: DataItemId::new(item)?,
            }),
            None => Ok(Self {
                device: None,
                data_item: DataItemId::new(token)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_data_item() {
        let r = DataItemRef::parse("Xpos").unwrap();
        assert_eq!(r.device, None);
        assert_eq!(r.data_item.as_str(), "Xpos");
    }

    #[test]
    fn parses_device_qualified_data_item() {
        let r = DataItemRef::parse("mill-1:Xpos").unwrap();
        assert_eq!(r.device.unwrap().as_str(), "mill-1");
        assert_eq!(r.data_item.as_str(), "Xpos");
    }

    #[test]
    fn rejects_empty_id() {
        assert!(DataItemId::new("").is_err());
    }
}
