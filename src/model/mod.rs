mod block;
mod genesis;
mod ids;
mod transaction;
mod vote;

pub use {
  block::{Block, BlockBody},
  genesis::build_genesis,
  ids::{BlockId, TxId},
  transaction::{
    Asset, Condition, ContractBody, ContractSignature, Fulfillment, Input, Metadata, Operation,
    Relation, RelationVote, Transaction, TransactionBody,
  },
  vote::{Vote, VoteBody},
};
