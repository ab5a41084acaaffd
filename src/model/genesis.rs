use {
  super::{Asset, Block, BlockBody, Operation, Transaction, TransactionBody},
  crate::crypto::{canonical_hash_hex, CanonicalizeError, Keypair, Pubkey},
};

/// Builds the distinguished genesis block: a single GENESIS transaction,
/// signed by `keypair`, with `voters` set to the full known federation.
/// Every validator's vote chain is rooted at this block's id.
pub fn build_genesis(
  keypair: &Keypair,
  voters: Vec<Pubkey>,
  chain_id: &str,
) -> Result<Block, CanonicalizeError> {
  let tx_body = TransactionBody {
    version: 1,
    operation: Operation::Genesis,
    fulfillments: vec![],
    conditions: vec![],
    asset: Asset {
      data_id: format!("genesis:{chain_id}"),
      data: serde_json::json!({ "chain_id": chain_id }),
      divisible: false,
      updatable: false,
      refillable: false,
    },
    metadata: None,
    contract: None,
    relation: None,
  };
  let tx_id = canonical_hash_hex(&tx_body)?;
  let tx = Transaction {
    id: tx_id.into(),
    body: tx_body,
  };

  let body = BlockBody {
    timestamp: 0,
    transactions: vec![tx],
    node_pubkey: keypair.public(),
    voters,
  };
  let id = canonical_hash_hex(&body)?;
  let signature = keypair.sign(&crate::crypto::canonical_bytes(&body)?);
  Ok(Block {
    id: id.into(),
    signature,
    block: body,
  })
}
