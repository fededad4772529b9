//! Transfer construction: compute budget, receiving-account creation, tips, and signing.

use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_keypair::Keypair;
use solana_message::{Hash, Instruction, Message, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::{Signer, SignerError, signers::Signers};
use solana_system_interface::instruction as system_instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_associated_token_account_interface::{
    address::get_associated_token_address,
    instruction::{create_associated_token_account, create_associated_token_account_idempotent},
};
use thiserror::Error;

use crate::amount::{AmountError, Asset};

/// Compute-unit limit for a native transfer.
pub const NATIVE_TRANSFER_COMPUTE_UNITS: u32 = 2_000;

/// Compute-unit limit for a token transfer, including receiving-account creation.
pub const TOKEN_TRANSFER_COMPUTE_UNITS: u32 = 60_000;

/// Builder-layer errors.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// Amount does not convert exactly to base units.
    #[error("invalid amount: {source}")]
    InvalidAmount {
        /// Conversion failure.
        source: AmountError,
    },
    /// Program instruction could not be constructed.
    #[error("failed to build instruction: {message}")]
    Instruction {
        /// Program error text.
        message: String,
    },
    /// Signing failed with signer-level error.
    #[error("failed to sign transaction: {source}")]
    SignTransaction {
        /// Underlying signer error.
        source: SignerError,
    },
    /// Signed transaction could not be serialized.
    #[error("failed to encode signed transaction: {source}")]
    Encode {
        /// Bincode error.
        source: Box<bincode::ErrorKind>,
    },
}

/// Legacy-message builder with compute-budget prefix and optional trailing tip.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    /// Fee payer and signer.
    payer: Pubkey,
    /// Body instructions.
    instructions: Vec<Instruction>,
    /// Optional compute unit limit.
    compute_unit_limit: Option<u32>,
    /// Optional priority fee (micro-lamports per compute unit).
    priority_fee_micro_lamports: Option<u64>,
    /// Optional trailing tip transfer.
    tip: Option<(Pubkey, u64)>,
}

impl TxBuilder {
    /// Creates a transaction builder for a fee payer.
    #[must_use]
    pub const fn new(payer: Pubkey) -> Self {
        Self {
            payer,
            instructions: Vec::new(),
            compute_unit_limit: None,
            priority_fee_micro_lamports: None,
            tip: None,
        }
    }

    /// Appends one instruction.
    #[must_use]
    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Appends many instructions.
    #[must_use]
    pub fn add_instructions<I>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.instructions.extend(instructions);
        self
    }

    /// Sets compute unit limit.
    #[must_use]
    pub const fn with_compute_unit_limit(mut self, units: u32) -> Self {
        self.compute_unit_limit = Some(units);
        self
    }

    /// Sets priority fee in micro-lamports.
    #[must_use]
    pub const fn with_priority_fee_micro_lamports(mut self, micro_lamports: u64) -> Self {
        self.priority_fee_micro_lamports = Some(micro_lamports);
        self
    }

    /// Appends a system transfer of `lamports` to `recipient` after the body.
    #[must_use]
    pub const fn tip_to(mut self, recipient: Pubkey, lamports: u64) -> Self {
        self.tip = Some((recipient, lamports));
        self
    }

    /// Builds and signs a transaction in one step.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::SignTransaction`] when signer validation or signing fails.
    pub fn build_and_sign<T>(
        self,
        recent_blockhash: [u8; 32],
        signers: &T,
    ) -> Result<VersionedTransaction, BuilderError>
    where
        T: Signers + ?Sized,
    {
        VersionedTransaction::try_new(self.build_message(recent_blockhash), signers)
            .map_err(|source| BuilderError::SignTransaction { source })
    }

    /// Builds a legacy message wrapped as a versioned message.
    #[must_use]
    pub fn build_message(self, recent_blockhash: [u8; 32]) -> VersionedMessage {
        let mut instructions = Vec::with_capacity(self.instructions.len().saturating_add(3));
        if let Some(units) = self.compute_unit_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        }
        if let Some(micro_lamports) = self.priority_fee_micro_lamports {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
                micro_lamports,
            ));
        }
        instructions.extend(self.instructions);
        if let Some((recipient, lamports)) = self.tip {
            instructions.push(system_instruction::transfer(
                &self.payer,
                &recipient,
                lamports,
            ));
        }
        let blockhash = Hash::new_from_array(recent_blockhash);
        let message = Message::new_with_blockhash(&instructions, Some(&self.payer), &blockhash);
        VersionedMessage::Legacy(message)
    }
}

/// Where a block-builder tip is carried.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TipPlacement {
    /// Appended to the transfer unit.
    Inline,
    /// A separate unit submitted next to the transfer in one bundle.
    Sibling,
}

/// Tip to attach to a transfer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TipPlan {
    /// Tip-collection account.
    pub recipient: Pubkey,
    /// Tip size.
    pub lamports: u64,
    /// Inline or sibling placement.
    pub placement: TipPlacement,
}

/// What to do about the destination's receiving token account.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum AccountCreation {
    /// Account exists.
    #[default]
    Skip,
    /// Account is missing; create it before the transfer.
    Create,
    /// Existence unknown; create it only if missing.
    CreateIdempotent,
}

/// Inputs for one transfer unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    /// Destination wallet.
    pub to: Pubkey,
    /// Decimal amount in asset units.
    pub amount: f64,
    /// Native coin or token.
    pub asset: Asset,
    /// Compute-unit price in micro-lamports.
    pub fee_micro_lamports: u64,
    /// Optional tip.
    pub tip: Option<TipPlan>,
    /// Receiving-account handling for token transfers.
    pub receiving_account: AccountCreation,
}

/// Signed, ready-to-send transfer, plus its sibling tip unit when bundled.
#[derive(Debug, Clone)]
pub struct SignedUnit {
    /// Signed transfer.
    transaction: VersionedTransaction,
    /// Signed sibling tip, bundle routes only.
    tip_transaction: Option<VersionedTransaction>,
    /// Transfer signature.
    signature: Signature,
}

impl SignedUnit {
    /// Returns the transfer signature, which identifies the unit on chain.
    #[must_use]
    pub const fn signature(&self) -> Signature {
        self.signature
    }

    /// Returns the signed transfer.
    #[must_use]
    pub const fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    /// Returns the sibling tip unit, if any.
    #[must_use]
    pub const fn tip_transaction(&self) -> Option<&VersionedTransaction> {
        self.tip_transaction.as_ref()
    }

    /// Serializes the transfer into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Encode`] when serialization fails.
    pub fn wire_bytes(&self) -> Result<Vec<u8>, BuilderError> {
        bincode::serialize(&self.transaction).map_err(|source| BuilderError::Encode { source })
    }

    /// Serializes the bundle: the transfer followed by the sibling tip when present.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Encode`] when serialization fails.
    pub fn bundle_wire_bytes(&self) -> Result<Vec<Vec<u8>>, BuilderError> {
        let mut bundle = vec![self.wire_bytes()?];
        if let Some(tip) = &self.tip_transaction {
            bundle.push(
                bincode::serialize(tip).map_err(|source| BuilderError::Encode { source })?,
            );
        }
        Ok(bundle)
    }
}

/// Builds and signs a transfer from `from` as described by `plan`.
///
/// Token transfers send from the sender's associated account to the destination's associated
/// account with a checked transfer. Any receiving-account creation precedes the transfer in the
/// same unit.
///
/// # Errors
///
/// Returns [`BuilderError::InvalidAmount`] when the amount is not exact at the asset precision,
/// or a construction or signing error.
pub fn build_transfer(
    from: &Keypair,
    plan: &TransferPlan,
    recent_blockhash: [u8; 32],
) -> Result<SignedUnit, BuilderError> {
    let payer = from.pubkey();
    let base_units = plan
        .asset
        .base_units(plan.amount)
        .map_err(|source| BuilderError::InvalidAmount { source })?;

    let mut builder =
        TxBuilder::new(payer).with_priority_fee_micro_lamports(plan.fee_micro_lamports);
    builder = match plan.asset {
        Asset::Native => builder
            .with_compute_unit_limit(NATIVE_TRANSFER_COMPUTE_UNITS)
            .add_instruction(system_instruction::transfer(&payer, &plan.to, base_units)),
        Asset::Token { mint, decimals } => builder
            .with_compute_unit_limit(TOKEN_TRANSFER_COMPUTE_UNITS)
            .add_instructions(token_transfer_instructions(
                &payer,
                &plan.to,
                &mint,
                decimals,
                base_units,
                plan.receiving_account,
            )?),
    };

    let mut tip_transaction = None;
    if let Some(tip) = plan.tip {
        match tip.placement {
            TipPlacement::Inline => builder = builder.tip_to(tip.recipient, tip.lamports),
            TipPlacement::Sibling => {
                tip_transaction = Some(
                    TxBuilder::new(payer)
                        .add_instruction(system_instruction::transfer(
                            &payer,
                            &tip.recipient,
                            tip.lamports,
                        ))
                        .build_and_sign(recent_blockhash, &[from])?,
                );
            }
        }
    }

    let transaction = builder.build_and_sign(recent_blockhash, &[from])?;
    let signature = transaction.signatures.first().copied().unwrap_or_default();
    Ok(SignedUnit {
        transaction,
        tip_transaction,
        signature,
    })
}

/// Receiving-account creation (when requested) followed by a checked token transfer.
fn token_transfer_instructions(
    payer: &Pubkey,
    to: &Pubkey,
    mint: &Pubkey,
    decimals: u8,
    base_units: u64,
    receiving_account: AccountCreation,
) -> Result<Vec<Instruction>, BuilderError> {
    let token_program = spl_token_interface::ID;
    let source = get_associated_token_address(payer, mint);
    let destination = get_associated_token_address(to, mint);
    let mut instructions = Vec::with_capacity(2);
    match receiving_account {
        AccountCreation::Skip => {}
        AccountCreation::Create => instructions.push(create_associated_token_account(
            payer,
            to,
            mint,
            &token_program,
        )),
        AccountCreation::CreateIdempotent => instructions.push(
            create_associated_token_account_idempotent(payer, to, mint, &token_program),
        ),
    }
    let transfer = spl_token_interface::instruction::transfer_checked(
        &token_program,
        &source,
        mint,
        &destination,
        payer,
        &[],
        base_units,
        decimals,
    )
    .map_err(|error| BuilderError::Instruction {
        message: error.to_string(),
    })?;
    instructions.push(transfer);
    Ok(instructions)
}
