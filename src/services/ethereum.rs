use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

/// Freshly generated Ethereum-style key pair
#[derive(Debug, Clone)]
pub struct WalletInfo {
    pub address: String,
    pub private_key: String,
}

/// Generate a random key pair and derive its address. No chain interaction;
/// the address is Keccak-256 of the uncompressed public key, last 20 bytes.
pub fn generate_wallet() -> WalletInfo {
    let secp = Secp256k1::new();
    let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());

    WalletInfo {
        address: address_from_pubkey(&public_key),
        private_key: format!("0x{}", hex::encode(secret_key.secret_bytes())),
    }
}

pub fn address_from_secret_key(secret_key: &SecretKey) -> String {
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_secret_key(&secp, secret_key);
    address_from_pubkey(&public_key)
}

fn address_from_pubkey(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]); // strip the 0x04 prefix
    format!("0x{}", hex::encode(&hash[12..]))
}

pub fn is_valid_address(address: &str) -> bool {
    let hex_part = match address.strip_prefix("0x") {
        Some(rest) => rest,
        None => return false,
    };
    hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_wallet_has_wellformed_address_and_key() {
        let wallet = generate_wallet();
        assert!(is_valid_address(&wallet.address));
        assert!(wallet.private_key.starts_with("0x"));
        assert_eq!(wallet.private_key.len(), 66);
        assert!(wallet.private_key[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_wallets_are_distinct() {
        let a = generate_wallet();
        let b = generate_wallet();
        assert_ne!(a.address, b.address);
        assert_ne!(a.private_key, b.private_key);
    }

    #[test]
    fn address_derivation_is_deterministic() {
        let wallet = generate_wallet();
        let raw = hex::decode(wallet.private_key.trim_start_matches("0x")).unwrap();
        let secret_key = SecretKey::from_slice(&raw).unwrap();
        assert_eq!(address_from_secret_key(&secret_key), wallet.address);
    }

    #[test]
    fn address_validation_rejects_malformed_input() {
        assert!(is_valid_address("0x52908400098527886e0f7030069857d2e4169ee7"));
        assert!(!is_valid_address("52908400098527886e0f7030069857d2e4169ee7"));
        assert!(!is_valid_address("0x5290840009852788"));
        assert!(!is_valid_address("0xzz908400098527886e0f7030069857d2e4169ee7"));
        assert!(!is_valid_address(""));
    }
}
