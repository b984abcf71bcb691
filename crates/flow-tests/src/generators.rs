//! Test data generators.

use ed25519_dalek::{Signer, SigningKey};
use flow_types::{
    AssetOutput, AssetOutputRef, LockupScript, NetworkId, PublicKey, Signature, Transaction,
    TxInput, U256, UnlockScript, UnsignedTransaction,
};

/// Deterministic keypair from a one-byte seed.
pub fn keypair(seed: u8) -> (SigningKey, PublicKey) {
    let sk = SigningKey::from_bytes(&[seed; 32]);
    let pk = PublicKey::from_bytes(sk.verifying_key().to_bytes());
    (sk, pk)
}

/// `n` ALF in sub-units.
pub fn alf(n: u64) -> U256 {
    U256::from_u128(n as u128 * flow_types::ONE_ALF)
}

/// Standard test gas price.
pub const GAS_PRICE: u64 = 100;

/// A signed P2PKH transfer spending `utxo` (holding `amount`) back to
/// the owner: one main output of `send` plus change after the gas fee.
pub fn signed_transfer(
    sk: &SigningKey,
    pk: &PublicKey,
    utxo: AssetOutputRef,
    amount: U256,
    send: U256,
    gas_amount: u64,
) -> Transaction {
    let fee = U256::from_u64(gas_amount)
        .checked_mul(&U256::from_u64(GAS_PRICE))
        .expect("fee fits");
    let change = amount
        .checked_sub(&send)
        .and_then(|rest| rest.checked_sub(&fee))
        .expect("amount covers send plus fee");

    let unsigned = UnsignedTransaction {
        network_id: NetworkId::Devnet,
        script_opt: None,
        gas_amount,
        gas_price: U256::from_u64(GAS_PRICE),
        inputs: vec![TxInput {
            output_ref: utxo,
            unlock_script: UnlockScript::P2pkh(*pk),
        }],
        fixed_outputs: vec![
            AssetOutput::new(send, LockupScript::p2pkh(pk)),
            AssetOutput::new(change, LockupScript::p2pkh(pk)),
        ],
    };
    let signature = Signature::from_bytes(sk.sign(unsigned.hash().as_bytes()).to_bytes());
    Transaction::new(unsigned, vec![signature])
}
