//! Diffie-Hellman key exchange for IKE_SA_INIT
//!
//! Implements the MODP groups from RFC 3526 (and the 1024-bit group from
//! RFC 2409) selectable through the D-H transform. Public values and shared
//! secrets are zero-padded to the prime length as RFC 7296 requires.
//!
//! # Security
//!
//! - Private exponents are generated from the thread RNG and zeroized on
//!   drop
//! - Peer public values are range-checked (1 < y < p-1) before use

use crate::ike::proposal::DhTransformId;
use crate::ike::{IkeError, Result};

use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use zeroize::Zeroize;

/// MODP group primes (RFC 2409 Section 6.2, RFC 3526)
mod primes {
    use super::*;

    fn prime_from_hex(hex_str: &str) -> BigUint {
        BigUint::from_bytes_be(&hex::decode(hex_str).expect("Invalid hex"))
    }

    /// 1024-bit MODP group (group 2)
    pub static P_1024: Lazy<BigUint> = Lazy::new(|| {
        prime_from_hex(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
             020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
             4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381FFFFFFFFFFFFFFFF",
        )
    });

    /// 1536-bit MODP group (group 5)
    pub static P_1536: Lazy<BigUint> = Lazy::new(|| {
        prime_from_hex(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
             020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
             4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
             98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
             9ED529077096966D670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
        )
    });

    /// 2048-bit MODP group (group 14)
    pub static P_2048: Lazy<BigUint> = Lazy::new(|| {
        prime_from_hex(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
             020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
             4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
             98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
             9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
             E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
             3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
        )
    });

    /// 3072-bit MODP group (group 15)
    pub static P_3072: Lazy<BigUint> = Lazy::new(|| {
        prime_from_hex(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
             020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
             4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
             98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
             9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
             E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
             3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33\
             A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7\
             ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864\
             D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2\
             08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
        )
    });

    /// 4096-bit MODP group (group 16)
    pub static P_4096: Lazy<BigUint> = Lazy::new(|| {
        prime_from_hex(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
             020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
             4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
             98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
             9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
             E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
             3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33\
             A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7\
             ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864\
             D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2\
             08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CA88719A10BDBA5B26\
             99C327186AF4E23C1A946834B6150BDA2583E9CA2AD44CE8DBBBC2DB04DE8EF9\
             2E8EFC141FBECAA6287C59474E6BC05D99B2964FA090C3A2233BA186515BE7ED\
             1F612970CEE2D7AFB81BDD762170481CD0069127D5B05AA993B4EA988D8FDDC1\
             86FFB7DC90A6C08F4DF435C934063199FFFFFFFFFFFFFFFF",
        )
    });

    /// Generator shared by all MODP groups
    pub static G: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));
}

/// MODP Diffie-Hellman group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DhGroup {
    /// 1024-bit MODP (group 2)
    Modp1024,
    /// 1536-bit MODP (group 5)
    Modp1536,
    /// 2048-bit MODP (group 14)
    Modp2048,
    /// 3072-bit MODP (group 15)
    Modp3072,
    /// 4096-bit MODP (group 16)
    Modp4096,
}

impl DhGroup {
    /// Build from a negotiated transform ID
    pub fn from_transform(id: DhTransformId) -> Self {
        match id {
            DhTransformId::Modp1024 => DhGroup::Modp1024,
            DhTransformId::Modp1536 => DhGroup::Modp1536,
            DhTransformId::Modp2048 => DhGroup::Modp2048,
            DhTransformId::Modp3072 => DhGroup::Modp3072,
            DhTransformId::Modp4096 => DhGroup::Modp4096,
        }
    }

    /// Transform ID for this group
    pub fn transform_id(self) -> DhTransformId {
        match self {
            DhGroup::Modp1024 => DhTransformId::Modp1024,
            DhGroup::Modp1536 => DhTransformId::Modp1536,
            DhGroup::Modp2048 => DhTransformId::Modp2048,
            DhGroup::Modp3072 => DhTransformId::Modp3072,
            DhGroup::Modp4096 => DhTransformId::Modp4096,
        }
    }

    /// Group number as it appears in the KE payload
    pub fn group_num(self) -> u16 {
        self.transform_id().to_u16()
    }

    /// Prime length in bytes; public values and shared secrets are padded
    /// to this length
    pub fn key_len(self) -> usize {
        match self {
            DhGroup::Modp1024 => 128,
            DhGroup::Modp1536 => 192,
            DhGroup::Modp2048 => 256,
            DhGroup::Modp3072 => 384,
            DhGroup::Modp4096 => 512,
        }
    }

    fn prime(self) -> &'static BigUint {
        match self {
            DhGroup::Modp1024 => &primes::P_1024,
            DhGroup::Modp1536 => &primes::P_1536,
            DhGroup::Modp2048 => &primes::P_2048,
            DhGroup::Modp3072 => &primes::P_3072,
            DhGroup::Modp4096 => &primes::P_4096,
        }
    }
}

/// Ephemeral Diffie-Hellman exchange for one IKE_SA_INIT
pub struct DhExchange {
    group: DhGroup,
    /// Private exponent bytes (zeroized on drop)
    private_key: Vec<u8>,
    /// Public value, padded to the prime length
    public_key: Vec<u8>,
}

impl DhExchange {
    /// Generate an ephemeral key pair for the given group
    pub fn new(group: DhGroup) -> Self {
        let mut rng = rand::thread_rng();

        let p = group.prime();
        let p_minus_one = p - 1u32;
        let x = rng.gen_biguint_range(&BigUint::from(2u32), &p_minus_one);

        let y = primes::G.modpow(&x, p);

        DhExchange {
            group,
            private_key: x.to_bytes_be(),
            public_key: left_pad(&y.to_bytes_be(), group.key_len()),
        }
    }

    /// The group this exchange was generated for
    pub fn group(&self) -> DhGroup {
        self.group
    }

    /// Public value for the KE payload
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Compute the shared secret from the peer's public value
    ///
    /// # Errors
    ///
    /// Returns error if the peer's value is out of range (y <= 1 or
    /// y >= p-1), which would leak the private key or force a trivial
    /// secret.
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>> {
        let p = self.group.prime();
        let y_peer = BigUint::from_bytes_be(peer_public);

        if y_peer <= BigUint::from(1u32) || y_peer >= p - 1u32 {
            return Err(IkeError::Crypto(
                "Invalid peer DH public value: out of range".into(),
            ));
        }

        let x = BigUint::from_bytes_be(&self.private_key);
        let k = y_peer.modpow(&x, p);

        Ok(left_pad(&k.to_bytes_be(), self.group.key_len()))
    }
}

impl std::fmt::Debug for DhExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhExchange")
            .field("group", &self.group)
            .field("public_key_len", &self.public_key.len())
            .finish()
    }
}

impl Drop for DhExchange {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Zero-pad a big-endian value to the group length
fn left_pad(value: &[u8], len: usize) -> Vec<u8> {
    if value.len() >= len {
        return value.to_vec();
    }
    let mut out = vec![0u8; len - value.len()];
    out.extend_from_slice(value);
    out
}
