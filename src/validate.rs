//! Validation rules for transactions and blocks (C3), per SPEC_FULL.md
//! §4.3. The control flow and exact exception taxonomy are grounded on
//! `bigchaindb/models.py`'s `Transaction.validate`/`Block.validate`.

use {
  crate::{
    crypto::canonical_bytes,
    errors::ValidationError,
    model::{Block, Operation, Transaction},
    store::{RecordStore, TxStatus},
  },
  crate::crypto::Pubkey,
};

/// Structural + signature checks for a block (B1-B4). Does not validate
/// the contained transactions -- that's done per-transaction by the
/// pipeline (§4.5) so it can be parallelized across S2/S3.
pub fn validate_block(block: &Block, known_validators: &[Pubkey]) -> Result<(), ValidationError> {
  let computed = block
    .compute_id()
    .map_err(|_| ValidationError::InvalidHash)?;
  if computed != block.id {
    return Err(ValidationError::InvalidHash);
  }

  if block.block.transactions.is_empty() {
    return Err(ValidationError::OperationError(
      "empty block creation is not allowed".into(),
    ));
  }

  if !known_validators.contains(&block.block.node_pubkey) {
    return Err(ValidationError::OperationError(
      "only federation nodes can create blocks".into(),
    ));
  }

  let bytes = canonical_bytes(&block.block).map_err(|_| ValidationError::InvalidSignature)?;
  if !block.block.node_pubkey.verify(&bytes, &block.signature) {
    return Err(ValidationError::InvalidSignature);
  }

  Ok(())
}

/// Full per-transaction validation (I1-I5), consulting the record store
/// for input/double-spend/asset-unification checks.
pub async fn validate_transaction(
  tx: &Transaction,
  store: &dyn RecordStore,
) -> Result<(), ValidationError> {
  let computed = tx.compute_id().map_err(|_| ValidationError::InvalidHash)?;
  if computed != tx.id {
    return Err(ValidationError::InvalidHash);
  }

  if tx.operation() == Operation::Metadata {
    return Ok(());
  }

  check_presence(tx)?;

  match tx.operation() {
    Operation::Create | Operation::Genesis => {
      if !tx.body.fulfillments.is_empty() {
        return Err(ValidationError::OperationError(
          "CREATE/GENESIS transactions must not carry inputs".into(),
        ));
      }
      if tx.body.asset.data_id.is_empty() {
        return Err(ValidationError::OperationError(
          "asset data_id must be set".into(),
        ));
      }
    }
    Operation::Transfer => validate_transfer(tx, store).await?,
    Operation::Contract => validate_contract(tx)?,
    Operation::Interim => {}
    Operation::Metadata => unreachable!("handled above"),
  }

  if tx.body.version == 2 {
    validate_relation(tx)?;
  }

  Ok(())
}

fn check_presence(tx: &Transaction) -> Result<(), ValidationError> {
  let op = tx.operation();
  if op.requires_fulfillments() && tx.body.fulfillments.is_empty() {
    return Err(ValidationError::OperationError(format!(
      "{op:?} transactions require at least one fulfillment"
    )));
  }
  if !op.requires_fulfillments() && !tx.body.fulfillments.is_empty() {
    return Err(ValidationError::OperationError(format!(
      "{op:?} transactions must not carry fulfillments"
    )));
  }
  if op.requires_conditions() && tx.body.conditions.is_empty() {
    return Err(ValidationError::OperationError(format!(
      "{op:?} transactions require at least one condition"
    )));
  }
  if !op.requires_conditions() && !tx.body.conditions.is_empty() {
    return Err(ValidationError::OperationError(format!(
      "{op:?} transactions must not carry conditions"
    )));
  }
  Ok(())
}

async fn validate_transfer(
  tx: &Transaction,
  store: &dyn RecordStore,
) -> Result<(), ValidationError> {
  let mut asset_ids = Vec::new();

  for fulfillment in &tx.body.fulfillments {
    let input = &fulfillment.input;
    let (input_tx, status) = store
      .get_tx(&input.txid)
      .await
      .map_err(|e| ValidationError::OperationError(e.to_string()))?;
    let input_tx = match (input_tx, status) {
      (None, _) | (_, TxStatus::NotFound) => {
        return Err(ValidationError::TransactionDoesNotExist(
          input.txid.clone(),
        ))
      }
      (Some(_), TxStatus::Invalid) | (Some(_), TxStatus::Undecided) | (Some(_), TxStatus::Backlog) => {
        return Err(ValidationError::FulfillmentNotInValidBlock(
          input.txid.clone(),
        ))
      }
      (Some(input_tx), TxStatus::Valid) => input_tx,
    };

    let spent = store
      .get_spent(&input.txid, input.cid)
      .await
      .map_err(|e| ValidationError::OperationError(e.to_string()))?;
    if let Some(spender) = spent {
      if spender.id != tx.id {
        return Err(ValidationError::DoubleSpend(input.txid.clone(), input.cid));
      }
    }

    let condition = input_tx
      .body
      .conditions
      .iter()
      .find(|c| c.cid == input.cid)
      .ok_or_else(|| ValidationError::TransactionDoesNotExist(input.txid.clone()))?;

    let signing_bytes = tx
      .body
      .transfer_signing_bytes()
      .map_err(|_| ValidationError::InvalidSignature)?;
    let verified = condition
      .owners_after
      .iter()
      .any(|owner| owner.verify(&signing_bytes, &fulfillment.fulfillment));
    if !verified {
      return Err(ValidationError::InvalidSignature);
    }

    asset_ids.push(input_tx.body.asset.data_id.clone());
  }

  if let Some(first) = asset_ids.first() {
    if asset_ids.iter().any(|id| id != first) || first != &tx.body.asset.data_id {
      return Err(ValidationError::AssetIdMismatch);
    }
  }

  Ok(())
}

fn validate_contract(tx: &Transaction) -> Result<(), ValidationError> {
  let contract = tx
    .body
    .contract
    .as_ref()
    .ok_or_else(|| ValidationError::OperationError("CONTRACT transaction missing contract body".into()))?;

  if contract.contract_owners.len() < contract.contract_signatures.len() {
    return Err(ValidationError::MultiContractOwner);
  }

  let signing_bytes = tx
    .body
    .contract_signing_bytes()
    .map_err(|_| ValidationError::InvalidSignature)?;

  for (owner, sig) in contract
    .contract_owners
    .iter()
    .zip(contract.contract_signatures.iter())
  {
    if !owner.verify(&signing_bytes, &sig.signature) {
      return Err(ValidationError::InvalidSignature);
    }
  }

  Ok(())
}

fn validate_relation(tx: &Transaction) -> Result<(), ValidationError> {
  let relation = match &tx.body.relation {
    Some(r) => r,
    None => return Ok(()),
  };

  if relation.voters.len() < relation.votes.len() {
    return Err(ValidationError::MultiContractNode);
  }

  for (voter, vote) in relation.voters.iter().zip(relation.votes.iter()) {
    if !voter.verify(tx.id.as_str().as_bytes(), &vote.signature) {
      return Err(ValidationError::InvalidSignature);
    }
  }

  Ok(())
}
