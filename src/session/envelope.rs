//! Message envelopes
//!
//! An envelope is `base64(nonce || ciphertext || tag)` with a fresh random
//! 96-bit nonce per message. Stored message content is either an envelope
//! or legacy plaintext, with no flag telling them apart, so decoding
//! falls back to passthrough whenever the input cannot be an envelope.
//!
//! Neither direction ever returns an error. Encryption falls back to
//! sending plaintext and decryption to passthrough or a fixed placeholder;
//! the [`Outgoing`] and [`Incoming`] variants say which happened.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, error, warn};

use crate::crypto::cipher::{NONCE_SIZE, TAG_SIZE};
use crate::crypto::{Cipher, CipherSuite, ExchangePublicKey};
use crate::error::CourierError;

use super::shared::SharedKeyDeriver;

/// Why an outgoing message was left unencrypted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// The local identity is not ready
    NotReady,
    /// No recipient key was supplied
    MissingPeerKey,
    /// The recipient key could not be parsed or used
    InvalidPeerKey,
    /// The AEAD refused the input
    CipherFailure,
}

/// Why an incoming message was returned as-is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassthroughReason {
    /// The local identity is not ready
    NotReady,
    /// No sender key was supplied
    MissingPeerKey,
    /// The sender key could not be parsed or used
    InvalidPeerKey,
    /// Not base64; treated as legacy plaintext
    NotEncoded,
    /// Decodes to fewer bytes than a nonce; treated as legacy plaintext
    TooShort,
}

/// Result of encrypting one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// Content is an envelope
    Encrypted(String),
    /// Content is the original plaintext
    Plaintext {
        /// Message text, unchanged
        content: String,
        /// Why encryption was skipped
        reason: FallbackReason,
    },
}

impl Outgoing {
    /// True when the content is an envelope
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Outgoing::Encrypted(_))
    }

    /// The text to store or send
    pub fn into_content(self) -> String {
        match self {
            Outgoing::Encrypted(content) | Outgoing::Plaintext { content, .. } => content,
        }
    }
}

/// Result of decrypting one stored message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incoming {
    /// Authenticated and decrypted
    Decrypted(String),
    /// Input returned unchanged
    Passthrough {
        /// Stored content, unchanged
        content: String,
        /// Why no decryption was attempted
        reason: PassthroughReason,
    },
    /// Decryption was attempted and failed; holds the placeholder text
    Undecryptable(String),
}

impl Incoming {
    /// The text to render
    pub fn into_content(self) -> String {
        match self {
            Incoming::Decrypted(content)
            | Incoming::Passthrough { content, .. }
            | Incoming::Undecryptable(content) => content,
        }
    }
}

/// Encrypts and decrypts envelopes with keys from a [`SharedKeyDeriver`]
pub struct EnvelopeCodec {
    deriver: SharedKeyDeriver,
    suite: CipherSuite,
    placeholder: String,
}

impl EnvelopeCodec {
    /// Codec using `suite`; failed decryptions render as `placeholder`
    pub fn new(
        deriver: SharedKeyDeriver,
        suite: CipherSuite,
        placeholder: impl Into<String>,
    ) -> Self {
        EnvelopeCodec {
            deriver,
            suite,
            placeholder: placeholder.into(),
        }
    }

    /// Key deriver backing this codec
    pub fn deriver(&self) -> &SharedKeyDeriver {
        &self.deriver
    }


    /// Encrypt `plaintext` for the holder of `peer_key`
    pub async fn seal(&self, plaintext: &str, peer_key: Option<&str>) -> Outgoing {
        let fallback = |reason: FallbackReason| {
            warn!(?reason, "sending message without end-to-end encryption");
            Outgoing::Plaintext {
                content: plaintext.to_string(),
                reason,
            }
        };

        if !self.deriver.lifecycle().is_ready() {
            return fallback(FallbackReason::NotReady);
        }
        let peer = match self.peer_key(peer_key) {
            Ok(peer) => peer,
            Err(PassthroughReason::MissingPeerKey) => {
                return fallback(FallbackReason::MissingPeerKey)
            }
            Err(_) => return fallback(FallbackReason::InvalidPeerKey),
        };

        let key = match self.deriver.shared_key_for(&peer).await {
            Ok(key) => key,
            Err(CourierError::NotReady) => return fallback(FallbackReason::NotReady),
            Err(_) => return fallback(FallbackReason::InvalidPeerKey),
        };

        match Cipher::encrypt(self.suite, key.as_bytes(), plaintext.as_bytes()) {
            Ok(sealed) => Outgoing::Encrypted(BASE64.encode(sealed)),
            Err(e) => {
                error!(error = %e, "envelope encryption failed");
                fallback(FallbackReason::CipherFailure)
            }
        }
    }

    /// Decrypt stored `content` received from the holder of `peer_key`
    pub async fn open(&self, content: &str, peer_key: Option<&str>) -> Incoming {
        let passthrough = |reason: PassthroughReason| Incoming::Passthrough {
            content: content.to_string(),
            reason,
        };

        if !self.deriver.lifecycle().is_ready() {
            warn!("identity not ready, showing message as stored");
            return passthrough(PassthroughReason::NotReady);
        }
        let peer = match self.peer_key(peer_key) {
            Ok(peer) => peer,
            Err(reason) => {
                warn!(?reason, "no usable sender key, showing message as stored");
                return passthrough(reason);
            }
        };

        let bytes = match BASE64.decode(content) {
            Ok(bytes) => bytes,
            Err(_) if looks_like_envelope(content) => {
                warn!(peer = %peer.fingerprint(), "damaged envelope");
                return Incoming::Undecryptable(self.placeholder.clone());
            }
            Err(_) => {
                debug!("content is not an envelope");
                return passthrough(PassthroughReason::NotEncoded);
            }
        };
        if bytes.len() < NONCE_SIZE {
            debug!(len = bytes.len(), "content too short to be an envelope");
            return passthrough(PassthroughReason::TooShort);
        }

        let key = match self.deriver.shared_key_for(&peer).await {
            Ok(key) => key,
            Err(CourierError::NotReady) => return passthrough(PassthroughReason::NotReady),
            Err(_) => return passthrough(PassthroughReason::InvalidPeerKey),
        };

        let opened = Cipher::decrypt(self.suite, key.as_bytes(), &bytes)
            .ok()
            .and_then(|plaintext| String::from_utf8(plaintext).ok());

        match opened {
            Some(plaintext) => Incoming::Decrypted(plaintext),
            None => {
                warn!(peer = %peer.fingerprint(), "message failed authentication");
                Incoming::Undecryptable(self.placeholder.clone())
            }
        }
    }

    /// `seal`, returning only the content
    pub async fn encrypt(&self, plaintext: &str, peer_key: Option<&str>) -> String {
        self.seal(plaintext, peer_key).await.into_content()
    }

    /// `open`, returning only the content
    pub async fn decrypt(&self, content: &str, peer_key: Option<&str>) -> String {
        self.open(content, peer_key).await.into_content()
    }

    fn peer_key(&self, peer_key: Option<&str>) -> Result<ExchangePublicKey, PassthroughReason> {
        match peer_key.map(str::trim) {
            None | Some("") => Err(PassthroughReason::MissingPeerKey),
            Some(material) => SharedKeyDeriver::parse_peer_key(material)
                .map_err(|_| PassthroughReason::InvalidPeerKey),
        }
    }
}

/// Base64 length of the smallest envelope (empty message)
const MIN_ENVELOPE_CHARS: usize = (NONCE_SIZE + TAG_SIZE + 2) / 3 * 4;

/// Whether undecodable `content` still has the shape of a damaged envelope
///
/// Padded base64 at least as long as an empty envelope, with at most one
/// character outside the alphabet. Legacy prose of that length carries
/// spaces and punctuation well past one.
fn looks_like_envelope(content: &str) -> bool {
    if content.len() < MIN_ENVELOPE_CHARS || content.len() % 4 != 0 {
        return false;
    }
    let foreign = content
        .bytes()
        .filter(|&b| !(b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')))
        .count();
    foreign <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{IdentityLifecycle, MemoryIdentityStore, MemoryKeyDirectory};
    use crate::session::shared::X25519Agreement;
    use proptest::prelude::*;
    use std::sync::Arc;

    const PLACEHOLDER: &str = "[Message could not be decrypted]";

    fn codec(suite: CipherSuite) -> EnvelopeCodec {
        let lifecycle = Arc::new(IdentityLifecycle::new(
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(MemoryKeyDirectory::new()),
        ));
        let deriver = SharedKeyDeriver::new(lifecycle, Arc::new(X25519Agreement::new("ctx")));
        EnvelopeCodec::new(deriver, suite, PLACEHOLDER)
    }

    /// Two ready codecs and each side's public key hex
    async fn pair(suite: CipherSuite) -> (EnvelopeCodec, String, EnvelopeCodec, String) {
        let alice = codec(suite);
        let bob = codec(suite);
        let a = alice.deriver().lifecycle().initialize("alice").await.unwrap();
        let b = bob.deriver().lifecycle().initialize("bob").await.unwrap();
        (alice, a.public_key().to_hex(), bob, b.public_key().to_hex())
    }

    #[tokio::test]
    async fn test_roundtrip() {
        for suite in [CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305] {
            let (alice, alice_pub, bob, bob_pub) = pair(suite).await;

            let sealed = alice.seal("hello bob", Some(bob_pub.as_str())).await;
            assert!(sealed.is_encrypted());

            let opened = bob.open(&sealed.into_content(), Some(alice_pub.as_str())).await;
            assert_eq!(opened, Incoming::Decrypted("hello bob".into()));
        }
    }

    #[tokio::test]
    async fn test_envelope_layout() {
        let (alice, _, _, bob_pub) = pair(CipherSuite::Aes256Gcm).await;

        let envelope = alice.encrypt("hi", Some(bob_pub.as_str())).await;
        let bytes = BASE64.decode(&envelope).unwrap();
        assert_eq!(bytes.len(), NONCE_SIZE + 2 + TAG_SIZE);
    }

    #[tokio::test]
    async fn test_nonce_freshness() {
        let (alice, _, _, bob_pub) = pair(CipherSuite::Aes256Gcm).await;

        let e1 = alice.encrypt("same text", Some(bob_pub.as_str())).await;
        let e2 = alice.encrypt("same text", Some(bob_pub.as_str())).await;
        assert_ne!(e1, e2);

        let n1 = BASE64.decode(&e1).unwrap();
        let n2 = BASE64.decode(&e2).unwrap();
        assert_ne!(n1[..NONCE_SIZE], n2[..NONCE_SIZE]);
    }

    #[tokio::test]
    async fn test_empty_and_unicode_plaintext() {
        let (alice, alice_pub, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;

        for text in ["", "héllo wörld 👋", "line one\nline two"] {
            let envelope = alice.encrypt(text, Some(bob_pub.as_str())).await;
            assert_ne!(envelope, text);
            assert_eq!(bob.decrypt(&envelope, Some(alice_pub.as_str())).await, text);
        }
    }

    #[tokio::test]
    async fn test_encrypt_fallbacks() {
        let (alice, _, _, _) = pair(CipherSuite::Aes256Gcm).await;

        assert_eq!(
            alice.seal("hi", None).await,
            Outgoing::Plaintext {
                content: "hi".into(),
                reason: FallbackReason::MissingPeerKey
            }
        );
        assert_eq!(
            alice.seal("hi", Some("  ")).await,
            Outgoing::Plaintext {
                content: "hi".into(),
                reason: FallbackReason::MissingPeerKey
            }
        );
        assert_eq!(
            alice.seal("hi", Some("not a key")).await,
            Outgoing::Plaintext {
                content: "hi".into(),
                reason: FallbackReason::InvalidPeerKey
            }
        );
        assert_eq!(
            alice.seal("hi", Some("00".repeat(32).as_str())).await,
            Outgoing::Plaintext {
                content: "hi".into(),
                reason: FallbackReason::InvalidPeerKey
            }
        );
    }

    #[tokio::test]
    async fn test_not_ready_passthrough() {
        let idle = codec(CipherSuite::Aes256Gcm);
        let peer = crate::crypto::IdentityKeyPair::generate().public_key().to_hex();

        assert_eq!(
            idle.seal("hi", Some(peer.as_str())).await,
            Outgoing::Plaintext {
                content: "hi".into(),
                reason: FallbackReason::NotReady
            }
        );
        assert_eq!(
            idle.open("aGVsbG8gd29ybGQgaGVsbG8gd29ybGQ=", Some(peer.as_str())).await,
            Incoming::Passthrough {
                content: "aGVsbG8gd29ybGQgaGVsbG8gd29ybGQ=".into(),
                reason: PassthroughReason::NotReady
            }
        );
    }

    #[tokio::test]
    async fn test_decrypt_fallbacks() {
        let (alice, alice_pub, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;
        let envelope = alice.encrypt("secret", Some(bob_pub.as_str())).await;

        assert_eq!(bob.decrypt(&envelope, None).await, envelope);
        assert_eq!(bob.decrypt(&envelope, Some("garbage")).await, envelope);
        assert_eq!(
            bob.open(&envelope, Some("garbage")).await,
            Incoming::Passthrough {
                content: envelope.clone(),
                reason: PassthroughReason::InvalidPeerKey
            }
        );
        assert_eq!(bob.decrypt(&envelope, Some(alice_pub.as_str())).await, "secret");
    }

    #[tokio::test]
    async fn test_legacy_plaintext_passthrough() {
        let (_, alice_pub, bob, _) = pair(CipherSuite::Aes256Gcm).await;

        // Shorter than a nonce once decoded
        assert_eq!(
            bob.open("hello", Some(alice_pub.as_str())).await,
            Incoming::Passthrough {
                content: "hello".into(),
                reason: PassthroughReason::NotEncoded
            }
        );
        assert_eq!(
            bob.open("aGk=", Some(alice_pub.as_str())).await,
            Incoming::Passthrough {
                content: "aGk=".into(),
                reason: PassthroughReason::TooShort
            }
        );
        assert_eq!(bob.decrypt("", Some(alice_pub.as_str())).await, "");
        assert_eq!(
            bob.decrypt("See you at 5, ok?", Some(alice_pub.as_str())).await,
            "See you at 5, ok?"
        );
    }

    #[tokio::test]
    async fn test_wrong_peer_gets_placeholder() {
        let (alice, _, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;
        let carol = crate::crypto::IdentityKeyPair::generate().public_key().to_hex();

        let envelope = alice.encrypt("for bob", Some(bob_pub.as_str())).await;
        assert_eq!(
            bob.open(&envelope, Some(carol.as_str())).await,
            Incoming::Undecryptable(PLACEHOLDER.into())
        );
    }

    #[tokio::test]
    async fn test_long_enough_but_not_an_envelope() {
        let (_, alice_pub, bob, _) = pair(CipherSuite::Aes256Gcm).await;

        // Valid base64 of 12..28 bytes: accepted imprecision, rendered as failure
        let content = BASE64.encode([7u8; NONCE_SIZE + 4]);
        assert_eq!(bob.decrypt(&content, Some(alice_pub.as_str())).await, PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_suite_mismatch_gets_placeholder() {
        let alice = codec(CipherSuite::Aes256Gcm);
        let bob = codec(CipherSuite::ChaCha20Poly1305);
        let a = alice.deriver().lifecycle().initialize("alice").await.unwrap();
        let b = bob.deriver().lifecycle().initialize("bob").await.unwrap();

        let envelope = alice.encrypt("hi", Some(b.public_key().to_hex().as_str())).await;
        assert_eq!(
            bob.decrypt(&envelope, Some(a.public_key().to_hex().as_str())).await,
            PLACEHOLDER
        );
    }

    #[tokio::test]
    async fn test_every_bit_flip_is_detected() {
        let (alice, alice_pub, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;
        let envelope = alice.encrypt("tamper me", Some(bob_pub.as_str())).await;
        let bytes = BASE64.decode(&envelope).unwrap();

        for bit in 0..bytes.len() * 8 {
            let mut tampered = bytes.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);

            let opened = bob.open(&BASE64.encode(&tampered), Some(alice_pub.as_str())).await;
            assert_eq!(opened, Incoming::Undecryptable(PLACEHOLDER.into()), "bit {}", bit);
        }
    }

    #[tokio::test]
    async fn test_every_bit_flip_of_envelope_text_is_detected() {
        let (alice, alice_pub, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;
        let envelope = alice.encrypt("hello", Some(bob_pub.as_str())).await;

        // Stored text stays ASCII, so flip the seven low bits of every character
        for i in 0..envelope.len() {
            for bit in 0..7 {
                let mut tampered = envelope.clone().into_bytes();
                tampered[i] ^= 1 << bit;
                let tampered = String::from_utf8(tampered).unwrap();

                let opened = bob.open(&tampered, Some(alice_pub.as_str())).await;
                assert_eq!(
                    opened,
                    Incoming::Undecryptable(PLACEHOLDER.into()),
                    "char {} bit {}: {:?}",
                    i,
                    bit,
                    tampered
                );
            }
        }
    }

    #[tokio::test]
    async fn test_long_legacy_text_still_passes_through() {
        let (_, alice_pub, bob, _) = pair(CipherSuite::Aes256Gcm).await;

        let text = "Running late, see you at the cafe at 6pm!";
        assert!(text.len() >= MIN_ENVELOPE_CHARS);
        assert_eq!(
            bob.open(text, Some(alice_pub.as_str())).await,
            Incoming::Passthrough {
                content: text.into(),
                reason: PassthroughReason::NotEncoded
            }
        );

        // Envelope-sized, but more than one character outside the alphabet
        let spaced = "abcd efgh ijkl mnop qrst uvwx yzAB CDEF GHIJ";
        assert_eq!(spaced.len() % 4, 0);
        assert_eq!(bob.decrypt(spaced, Some(alice_pub.as_str())).await, spaced);
    }

    #[test]
    fn test_envelope_shape() {
        assert_eq!(MIN_ENVELOPE_CHARS, 40);
        assert!(looks_like_envelope(&"A".repeat(44)));
        assert!(looks_like_envelope(&format!("{}:", "A".repeat(43))));
        assert!(!looks_like_envelope(&format!("{}::", "A".repeat(42))));
        assert!(!looks_like_envelope(&"A".repeat(43)));
        assert!(!looks_like_envelope(&"A".repeat(36)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_roundtrip_any_text(text in ".*") {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (alice, alice_pub, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;
                let envelope = alice.encrypt(&text, Some(bob_pub.as_str())).await;
                let opened = bob.decrypt(&envelope, Some(alice_pub.as_str())).await;
                prop_assert_eq!(opened, text.clone());
                Ok(())
            })?;
        }

        #[test]
        fn prop_truncation_never_yields_plaintext(cut in 0usize..40) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (alice, alice_pub, bob, bob_pub) = pair(CipherSuite::Aes256Gcm).await;
                let envelope = alice.encrypt("truncate me please", Some(bob_pub.as_str())).await;
                let bytes = BASE64.decode(&envelope).unwrap();
                let cut = cut.min(bytes.len() - 1);
                let shortened = BASE64.encode(&bytes[..cut]);

                let opened = bob.decrypt(&shortened, Some(alice_pub.as_str())).await;
                prop_assert_ne!(opened.as_str(), "truncate me please");
                Ok(())
            })?;
        }
    }
}
