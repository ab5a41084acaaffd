use {
  serde::{Deserialize, Serialize},
  std::fmt::{Display, Formatter},
};

macro_rules! hex_id {
  ($name:ident, $doc:literal) => {
    #[doc = $doc]
    #[derive(
      Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
      }

      pub fn as_str(&self) -> &str {
        &self.0
      }
    }

    impl Display for $name {
      fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl From<String> for $name {
      fn from(s: String) -> Self {
        Self(s)
      }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self {
        Self(s.to_owned())
      }
    }
  };
}

hex_id!(TxId, "Content-hash identifier of a transaction.");
hex_id!(BlockId, "Content-hash identifier of a block.");
