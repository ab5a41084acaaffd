use {
  ed25519_dalek::{
    PublicKey,
    SecretKey,
    Signature as DalekSignature,
    Signer,
    Verifier,
  },
  serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer},
  std::{
    fmt::{Debug, Display, Formatter},
    ops::Deref,
    str::FromStr,
  },
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum KeyError {
  #[error("invalid base58 encoding: {0}")]
  Base58(#[from] bs58::decode::Error),

  #[error("invalid base64 encoding: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("invalid key material: {0}")]
  Signature(#[from] ed25519_dalek::SignatureError),

  #[error("expected {expected} bytes, got {actual}")]
  WrongLength { expected: usize, actual: usize },
}

/// A validator's Ed25519 public identity, rendered as a base58 string in
/// every external representation (vote/block JSON, config files).
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
    if bytes.len() != 32 {
      return Err(KeyError::WrongLength {
        expected: 32,
        actual: bytes.len(),
      });
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(bytes);
    // validate it decodes to a point on the curve
    PublicKey::from_bytes(&buf)?;
    Ok(Self(buf))
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  fn dalek(&self) -> PublicKey {
    PublicKey::from_bytes(&self.0).expect("validated at construction")
  }

  pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
    self.dalek().verify(message, &signature.0).is_ok()
  }
}

impl Deref for Pubkey {
  type Target = [u8; 32];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Debug for Pubkey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "Pubkey({self})")
  }
}

impl Display for Pubkey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", bs58::encode(self.0).into_string())
  }
}

impl FromStr for Pubkey {
  type Err = KeyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = bs58::decode(s).into_vec()?;
    Self::from_bytes(&bytes)
  }
}

impl From<Pubkey> for String {
  fn from(pk: Pubkey) -> Self {
    pk.to_string()
  }
}

impl TryFrom<&[u8]> for Pubkey {
  type Error = KeyError;

  fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
    Self::from_bytes(value)
  }
}

impl Serialize for Pubkey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Pubkey {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct PubkeyVisitor;
    impl<'de> Visitor<'de> for PubkeyVisitor {
      type Value = Pubkey;

      fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "a base58-encoded ed25519 public key")
      }

      fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Pubkey::from_str(v).map_err(serde::de::Error::custom)
      }
    }
    deserializer.deserialize_str(PubkeyVisitor)
  }
}

/// A detached Ed25519 signature, rendered as base64 in every external
/// representation.
#[derive(Clone, Copy)]
pub struct Signature(DalekSignature);

impl Signature {
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
    Ok(Self(DalekSignature::from_bytes(bytes)?))
  }

  pub fn as_bytes(&self) -> [u8; 64] {
    self.0.to_bytes()
  }

  /// An all-zero placeholder, used to blank a signature field out of a
  /// structure before hashing it for signing (the field must stay
  /// present and the same byte length so the canonical form is stable).
  pub fn placeholder() -> Self {
    Self::from_bytes(&[0u8; 64]).expect("64 zero bytes parse as a signature")
  }
}

impl PartialEq for Signature {
  fn eq(&self, other: &Self) -> bool {
    self.0.to_bytes() == other.0.to_bytes()
  }
}
impl Eq for Signature {}

impl Debug for Signature {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "Signature({self})")
  }
}

impl Display for Signature {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", base64::encode(self.as_bytes()))
  }
}

impl FromStr for Signature {
  type Err = KeyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = base64::decode(s)?;
    Self::from_bytes(&bytes)
  }
}

impl Serialize for Signature {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Signature {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Signature::from_str(&s).map_err(serde::de::Error::custom)
  }
}

/// This node's signing identity. Never serialized; constructed once at
/// startup from the `keypair.private` configuration value and held for
/// the lifetime of the process.
#[derive(Clone)]
pub struct Keypair {
  secret_bytes: [u8; 32],
  public: Pubkey,
}

impl Keypair {
  pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
    let dalek = ed25519_dalek::Keypair::generate(rng);
    Self {
      secret_bytes: dalek.secret.to_bytes(),
      public: Pubkey(dalek.public.to_bytes()),
    }
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
    if bytes.len() != 32 {
      return Err(KeyError::WrongLength {
        expected: 32,
        actual: bytes.len(),
      });
    }
    let mut secret_bytes = [0u8; 32];
    secret_bytes.copy_from_slice(bytes);
    let secret = SecretKey::from_bytes(&secret_bytes)?;
    let public: PublicKey = (&secret).into();
    Ok(Self {
      secret_bytes,
      public: Pubkey(public.to_bytes()),
    })
  }

  pub fn public(&self) -> Pubkey {
    self.public
  }

  fn dalek(&self) -> ed25519_dalek::Keypair {
    let secret = SecretKey::from_bytes(&self.secret_bytes).expect("validated at construction");
    let public: PublicKey = (&secret).into();
    ed25519_dalek::Keypair { secret, public }
  }

  pub fn sign(&self, message: &[u8]) -> Signature {
    Signature(self.dalek().sign(message))
  }
}

impl Debug for Keypair {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "Keypair({})", self.public)
  }
}

impl FromStr for Keypair {
  type Err = KeyError;

  /// Parses a base58-encoded 32-byte secret seed, the same encoding used
  /// for the `keypair.private` configuration value.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = bs58::decode(s).into_vec()?;
    Self::from_bytes(&bytes)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn keypair() -> Keypair {
    Keypair::generate(&mut rand::thread_rng())
  }

  #[test]
  fn sign_and_verify_roundtrip() {
    let kp = keypair();
    let msg = b"hello federation";
    let sig = kp.sign(msg);
    assert!(kp.public().verify(msg, &sig));
  }

  #[test]
  fn tampered_message_fails_without_panic() {
    let kp = keypair();
    let sig = kp.sign(b"original");
    assert!(!kp.public().verify(b"tampered", &sig));
  }

  #[test]
  fn tampered_signature_fails_without_panic() {
    let kp = keypair();
    let msg = b"hello";
    let mut bytes = kp.sign(msg).as_bytes();
    bytes[0] ^= 0xff;
    let bad = Signature::from_bytes(&bytes).unwrap();
    assert!(!kp.public().verify(msg, &bad));
  }

  #[test]
  fn pubkey_base58_roundtrip() {
    let kp = keypair();
    let s = kp.public().to_string();
    let parsed: Pubkey = s.parse().unwrap();
    assert_eq!(parsed, kp.public());
  }

  #[test]
  fn garbage_pubkey_string_is_rejected() {
    assert!("not-base58-!!!".parse::<Pubkey>().is_err());
  }
}
