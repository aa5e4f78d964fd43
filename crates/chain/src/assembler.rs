//! Versioned-transaction assembly.
//!
//! Turns the winning quote into a signed transaction that fits the 1232-byte
//! wire ceiling. Prebuilt payloads are re-signed as-is; instruction payloads
//! are compiled into a v0 message, with every account that a lookup table
//! can cover referenced by `(table, index)` instead of a full 32-byte key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{CompiledInstruction, Instruction};
use solana_sdk::message::v0::{self, MessageAddressTableLookup};
use solana_sdk::message::{MessageHeader, VersionedMessage};
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;
use titanswap_wire::{Quote, QuotePayload};
use tracing::debug;

use crate::lookup::{load_lookup_tables, LookupTable};
use crate::provider::{ChainRpc, RpcError};
use crate::signer::{Delegation, DelegationReason};

/// Why an assembled transaction was refused, and where the bytes went.
#[derive(Debug, Clone)]
pub struct SizeDiagnostic {
    pub serialized_size: usize,
    pub static_keys: usize,
    pub lookup_keys: usize,
    /// Largest instructions by serialized footprint: (program, bytes).
    pub top_contributors: Vec<(String, usize)>,
}

impl fmt::Display for SizeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serialized {} bytes exceeds the {PACKET_DATA_SIZE}-byte ceiling \
             (static keys: {}, lookup-resolved keys: {}",
            self.serialized_size, self.static_keys, self.lookup_keys
        )?;
        if !self.top_contributors.is_empty() {
            write!(f, "; largest instructions:")?;
            for (program, bytes) in &self.top_contributors {
                write!(f, " {program}={bytes}B")?;
            }
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Error)]
pub enum AssembleError {
    #[error("delegation refused to sign: {0}")]
    Delegation(#[from] DelegationReason),

    /// The transaction exceeds the wire ceiling. For prebuilt payloads this
    /// is a server bug; no attempt is made to shrink them.
    #[error("{0}")]
    TooLarge(SizeDiagnostic),

    #[error("malformed quote payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Builds and signs the transaction for a winning quote.
pub struct Assembler<R> {
    rpc: Arc<R>,
}

impl<R: ChainRpc> Assembler<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        Self { rpc }
    }

    /// Assemble and sign. Every delegation check runs before the signer or
    /// the chain is touched; any failure refuses the whole swap.
    pub async fn assemble(
        &self,
        quote: &Quote,
        input_mint: &Pubkey,
        delegation: &Delegation,
    ) -> Result<VersionedTransaction, AssembleError> {
        delegation.authorize(input_mint, quote.in_amount, Utc::now())?;

        match &quote.payload {
            QuotePayload::Prebuilt { transaction } => sign_prebuilt(transaction, delegation),
            QuotePayload::Instructions {
                instructions,
                lookup_tables,
            } => {
                self.build_from_instructions(instructions, lookup_tables, delegation)
                    .await
            }
        }
    }

    async fn build_from_instructions(
        &self,
        instructions: &[Instruction],
        lookup_keys: &[Pubkey],
        delegation: &Delegation,
    ) -> Result<VersionedTransaction, AssembleError> {
        let payer = delegation.delegate.pubkey();
        let tables = load_lookup_tables(self.rpc.as_ref(), lookup_keys).await?;
        // Fetched last, immediately before signing, so the validity window
        // is as wide as possible at submission time.
        let recent_blockhash = self.rpc.latest_blockhash().await?;

        let message = compile_message(&payer, instructions, &tables, recent_blockhash)?;
        let message = VersionedMessage::V0(message);
        let signature = delegation.delegate.sign_message(&message.serialize());

        let mut signatures =
            vec![Signature::default(); message.header().num_required_signatures as usize];
        // The payer leads the signer region by construction.
        signatures[0] = signature;

        let tx = VersionedTransaction {
            signatures,
            message,
        };
        let size = check_size(&tx)?;
        debug!(
            size,
            static_keys = tx.message.static_account_keys().len(),
            lookup_tables = lookup_keys.len(),
            "transaction assembled"
        );
        Ok(tx)
    }
}

/// Path A: adopt a server-built transaction, replacing the delegate's
/// signature slot.
fn sign_prebuilt(
    bytes: &[u8],
    delegation: &Delegation,
) -> Result<VersionedTransaction, AssembleError> {
    let mut tx: VersionedTransaction = bincode::deserialize(bytes)
        .map_err(|err| AssembleError::MalformedPayload(format!("prebuilt transaction: {err}")))?;

    let delegate = delegation.delegate.pubkey();
    let position = signer_position(&tx.message, &delegate)
        .ok_or(AssembleError::Delegation(DelegationReason::DelegateNotSigner))?;

    let signature = delegation.delegate.sign_message(&tx.message.serialize());
    let required = tx.message.header().num_required_signatures as usize;
    if tx.signatures.len() != required {
        tx.signatures.resize(required, Signature::default());
    }
    tx.signatures[position] = signature;

    check_size(&tx)?;
    Ok(tx)
}

/// Position of `delegate` within the message's signer region.
fn signer_position(message: &VersionedMessage, delegate: &Pubkey) -> Option<usize> {
    let required = message.header().num_required_signatures as usize;
    message
        .static_account_keys()
        .get(..required)?
        .iter()
        .position(|key| key == delegate)
}

#[derive(Debug, Clone, Copy, Default)]
struct KeyUse {
    is_signer: bool,
    is_writable: bool,
    is_invoked: bool,
}

/// Every key the transaction touches, in first-use order, payer first.
fn collect_key_uses(payer: &Pubkey, instructions: &[Instruction]) -> Vec<(Pubkey, KeyUse)> {
    let mut order: Vec<Pubkey> = vec![*payer];
    let mut uses: HashMap<Pubkey, KeyUse> = HashMap::from([(
        *payer,
        KeyUse {
            is_signer: true,
            is_writable: true,
            is_invoked: false,
        },
    )]);
    for ix in instructions {
        let entry = uses.entry(ix.program_id).or_insert_with(|| {
            order.push(ix.program_id);
            KeyUse::default()
        });
        entry.is_invoked = true;
        for meta in &ix.accounts {
            let entry = uses.entry(meta.pubkey).or_insert_with(|| {
                order.push(meta.pubkey);
                KeyUse::default()
            });
            entry.is_signer |= meta.is_signer;
            entry.is_writable |= meta.is_writable;
        }
    }
    order.into_iter().map(|key| (key, uses[&key])).collect()
}

/// Per-table record of which entries the message loads. Writable and
/// readonly index lists stay disjoint because every key is resolved exactly
/// once.
struct TableUse<'a> {
    table: &'a LookupTable,
    writable_indexes: Vec<u8>,
    writable_keys: Vec<Pubkey>,
    readonly_indexes: Vec<u8>,
    readonly_keys: Vec<Pubkey>,
}

/// Compile instructions into a v0 message.
///
/// Static keys are the fee payer, all signers, writable keys invoked as
/// programs, and anything no loaded table covers. Everything else becomes a
/// `(table, index)` reference; the first table containing a key wins. The
/// final index space is static keys, then writable lookups in table order,
/// then readonly lookups in table order.
fn compile_message(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &[LookupTable],
    recent_blockhash: Hash,
) -> Result<v0::Message, AssembleError> {
    let key_uses = collect_key_uses(payer, instructions);

    let mut writable_signers: Vec<Pubkey> = Vec::new();
    let mut readonly_signers: Vec<Pubkey> = Vec::new();
    let mut writable_statics: Vec<Pubkey> = Vec::new();
    let mut readonly_statics: Vec<Pubkey> = Vec::new();
    let mut table_uses: Vec<TableUse> = tables
        .iter()
        .map(|table| TableUse {
            table,
            writable_indexes: Vec::new(),
            writable_keys: Vec::new(),
            readonly_indexes: Vec::new(),
            readonly_keys: Vec::new(),
        })
        .collect();

    for (key, usage) in &key_uses {
        if usage.is_signer {
            if usage.is_writable {
                writable_signers.push(*key);
            } else {
                readonly_signers.push(*key);
            }
            continue;
        }
        if usage.is_invoked && usage.is_writable {
            // A writable program id cannot be loaded from a table.
            writable_statics.push(*key);
            continue;
        }
        let resolved = table_uses
            .iter_mut()
            .find_map(|table_use| table_use.table.position(key).map(|index| (table_use, index)));
        match resolved {
            Some((table_use, index)) if usage.is_writable => {
                table_use.writable_indexes.push(index);
                table_use.writable_keys.push(*key);
            }
            Some((table_use, index)) => {
                table_use.readonly_indexes.push(index);
                table_use.readonly_keys.push(*key);
            }
            None if usage.is_writable => writable_statics.push(*key),
            None => readonly_statics.push(*key),
        }
    }

    let header = MessageHeader {
        num_required_signatures: (writable_signers.len() + readonly_signers.len()) as u8,
        num_readonly_signed_accounts: readonly_signers.len() as u8,
        num_readonly_unsigned_accounts: readonly_statics.len() as u8,
    };

    let mut account_keys = writable_signers;
    account_keys.extend(readonly_signers);
    account_keys.extend(writable_statics);
    account_keys.extend(readonly_statics);

    let mut index_of: HashMap<Pubkey, usize> = HashMap::new();
    for (index, key) in account_keys.iter().enumerate() {
        index_of.insert(*key, index);
    }
    let mut next = account_keys.len();
    for table_use in &table_uses {
        for key in &table_use.writable_keys {
            index_of.insert(*key, next);
            next += 1;
        }
    }
    for table_use in &table_uses {
        for key in &table_use.readonly_keys {
            index_of.insert(*key, next);
            next += 1;
        }
    }
    if next > usize::from(u8::MAX) + 1 {
        return Err(AssembleError::MalformedPayload(format!(
            "{next} account keys cannot be indexed in one transaction"
        )));
    }

    let compiled = instructions
        .iter()
        .map(|ix| {
            let program_id_index = index_for(&index_of, &ix.program_id)?;
            let accounts = ix
                .accounts
                .iter()
                .map(|meta| index_for(&index_of, &meta.pubkey))
                .collect::<Result<Vec<u8>, AssembleError>>()?;
            Ok(CompiledInstruction {
                program_id_index,
                accounts,
                data: ix.data.clone(),
            })
        })
        .collect::<Result<Vec<_>, AssembleError>>()?;

    let address_table_lookups = table_uses
        .into_iter()
        .filter(|table_use| {
            !table_use.writable_indexes.is_empty() || !table_use.readonly_indexes.is_empty()
        })
        .map(|table_use| MessageAddressTableLookup {
            account_key: table_use.table.key,
            writable_indexes: table_use.writable_indexes,
            readonly_indexes: table_use.readonly_indexes,
        })
        .collect();

    Ok(v0::Message {
        header,
        account_keys,
        recent_blockhash,
        instructions: compiled,
        address_table_lookups,
    })
}

fn index_for(index_of: &HashMap<Pubkey, usize>, key: &Pubkey) -> Result<u8, AssembleError> {
    index_of
        .get(key)
        .map(|index| *index as u8)
        .ok_or_else(|| AssembleError::MalformedPayload(format!("no index for account {key}")))
}

fn check_size(tx: &VersionedTransaction) -> Result<usize, AssembleError> {
    let bytes = bincode::serialize(tx)
        .map_err(|err| AssembleError::MalformedPayload(format!("serialization failed: {err}")))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(AssembleError::TooLarge(diagnose(tx, bytes.len())));
    }
    Ok(bytes.len())
}

fn diagnose(tx: &VersionedTransaction, serialized_size: usize) -> SizeDiagnostic {
    let static_keys = tx.message.static_account_keys().len();
    let lookup_keys = tx
        .message
        .address_table_lookups()
        .map(|lookups| {
            lookups
                .iter()
                .map(|lookup| lookup.writable_indexes.len() + lookup.readonly_indexes.len())
                .sum()
        })
        .unwrap_or(0);
    let mut top_contributors: Vec<(String, usize)> = tx
        .message
        .instructions()
        .iter()
        .map(|ix| {
            let program = tx
                .message
                .static_account_keys()
                .get(ix.program_id_index as usize)
                .map(|key| key.to_string())
                .unwrap_or_else(|| format!("lookup#{}", ix.program_id_index));
            (program, ix.data.len() + ix.accounts.len() + 2)
        })
        .collect();
    top_contributors.sort_by(|a, b| b.1.cmp(&a.1));
    top_contributors.truncate(3);
    SizeDiagnostic {
        serialized_size,
        static_keys,
        lookup_keys,
        top_contributors,
    }
}
