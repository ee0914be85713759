use nostr::secp256k1::ecdh::shared_secret_point;
use nostr::secp256k1::{PublicKey, SecretKey};

/// Performs the secp256k1 scalar multiplication behind every shared secret.
///
/// Kept behind a trait so the envelope's caching can be observed in tests.
pub trait EcdhProvider: Send + Sync {
    /// Returns the x-coordinate of `secret_key * public_key`, unhashed.
    fn shared_x(&self, secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32];
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Ecdh;

impl EcdhProvider for Secp256k1Ecdh {
    fn shared_x(&self, secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32] {
        let point = shared_secret_point(public_key, secret_key);
        let mut x = [0u8; 32];
        x.copy_from_slice(&point[..32]);
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::secp256k1::Secp256k1;

    #[test]
    fn shared_x_is_symmetric() {
        let secp = Secp256k1::new();
        let a = SecretKey::from_slice(&[3u8; 32]).unwrap();
        let b = SecretKey::from_slice(&[5u8; 32]).unwrap();
        let a_pub = PublicKey::from_secret_key(&secp, &a);
        let b_pub = PublicKey::from_secret_key(&secp, &b);

        let ecdh = Secp256k1Ecdh;
        assert_eq!(ecdh.shared_x(&a, &b_pub), ecdh.shared_x(&b, &a_pub));
    }
}
