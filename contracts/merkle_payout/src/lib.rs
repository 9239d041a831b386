#![no_std]

//! Pays out round-match funds against a fixed Merkle root.
//!
//! Leaves commit to `(index, payee, amount)`. Each index can be paid once;
//! claimed indices are tracked in a packed bitmap of 128-bit words.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, token, xdr::ToXdr, Address,
    Bytes, BytesN, Env, Vec,
};

/// Claim indices tracked per bitmap storage word.
pub const BITMAP_WORD_BITS: u32 = 128;

const BITMAP_TTL_EXTEND_TO: u32 = 518_400;
const BITMAP_TTL_THRESHOLD: u32 = BITMAP_TTL_EXTEND_TO - 17_280;

const INSTANCE_TTL_EXTEND_TO: u32 = 518_400;
const INSTANCE_TTL_THRESHOLD: u32 = INSTANCE_TTL_EXTEND_TO - 17_280;

#[contract]
pub struct MerklePayout;

#[derive(Clone, Debug)]
#[contracttype]
pub struct Claim {
    pub index: u32,
    pub payee: Address,
    pub amount: i128,
    pub proof: Vec<BytesN<32>>,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Funder,
    Token,
    MerkleRoot,
    ClaimedWord(u32),
}

#[contracterror]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    AlreadyClaimed = 3,
    InvalidProof = 4,
    InvalidAmount = 5,
}

fn read_funder(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Funder)
        .ok_or(Error::NotInitialized)
}

fn read_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)
}

fn read_merkle_root(env: &Env) -> Result<BytesN<32>, Error> {
    env.storage()
        .instance()
        .get(&DataKey::MerkleRoot)
        .ok_or(Error::NotInitialized)
}

fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(INSTANCE_TTL_THRESHOLD, INSTANCE_TTL_EXTEND_TO);
}

fn bitmap_position(index: u32) -> (u32, u128) {
    (index / BITMAP_WORD_BITS, 1u128 << (index % BITMAP_WORD_BITS))
}

fn read_claimed_word(env: &Env, word_index: u32) -> u128 {
    env.storage()
        .persistent()
        .get(&DataKey::ClaimedWord(word_index))
        .unwrap_or(0)
}

fn is_index_claimed(env: &Env, index: u32) -> bool {
    let (word_index, mask) = bitmap_position(index);
    read_claimed_word(env, word_index) & mask != 0
}

fn set_claimed(env: &Env, index: u32) {
    let (word_index, mask) = bitmap_position(index);
    let key = DataKey::ClaimedWord(word_index);
    let word = read_claimed_word(env, word_index) | mask;
    env.storage().persistent().set(&key, &word);
    env.storage()
        .persistent()
        .extend_ttl(&key, BITMAP_TTL_THRESHOLD, BITMAP_TTL_EXTEND_TO);
}

/// `keccak256(index_be || xdr(payee) || amount_be)`
pub fn leaf_hash(env: &Env, index: u32, payee: &Address, amount: i128) -> BytesN<32> {
    let mut packed = Bytes::from_array(env, &index.to_be_bytes());
    packed.append(&payee.clone().to_xdr(env));
    packed.extend_from_array(&amount.to_be_bytes());
    env.crypto().keccak256(&packed).to_bytes()
}

/// Hashes a sibling pair in sorted order so proofs need no direction bits.
pub fn hash_pair(env: &Env, a: &BytesN<32>, b: &BytesN<32>) -> BytesN<32> {
    let (a, b) = (a.to_array(), b.to_array());
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut packed = Bytes::from_array(env, &low);
    packed.extend_from_array(&high);
    env.crypto().keccak256(&packed).to_bytes()
}

pub fn verify_proof(
    env: &Env,
    proof: &Vec<BytesN<32>>,
    root: &BytesN<32>,
    leaf: BytesN<32>,
) -> bool {
    let mut computed = leaf;
    for node in proof.iter() {
        computed = hash_pair(env, &computed, &node);
    }
    computed == *root
}

fn process_claim(env: &Env, claim: &Claim) -> Result<(), Error> {
    if claim.amount <= 0 {
        return Err(Error::InvalidAmount);
    }

    if is_index_claimed(env, claim.index) {
        return Err(Error::AlreadyClaimed);
    }

    let root = read_merkle_root(env)?;
    let leaf = leaf_hash(env, claim.index, &claim.payee, claim.amount);
    if !verify_proof(env, &claim.proof, &root, leaf) {
        return Err(Error::InvalidProof);
    }

    set_claimed(env, claim.index);
    extend_instance_ttl(env);

    let token = read_token(env)?;
    let client = token::Client::new(env, &token);
    client.transfer(&env.current_contract_address(), &claim.payee, &claim.amount);

    env.events().publish(
        (symbol_short!("claimed"), claim.index),
        (claim.payee.clone(), claim.amount),
    );

    Ok(())
}

#[contractimpl]
impl MerklePayout {
    /// Fixes the funder, payout token and Merkle root. Callable once.
    pub fn initialize(
        env: Env,
        funder: Address,
        token: Address,
        merkle_root: BytesN<32>,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Funder) {
            return Err(Error::AlreadyInitialized);
        }
        funder.require_auth();
        env.storage().instance().set(&DataKey::Funder, &funder);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage()
            .instance()
            .set(&DataKey::MerkleRoot, &merkle_root);
        extend_instance_ttl(&env);
        Ok(())
    }

    pub fn is_claimed(env: Env, index: u32) -> bool {
        is_index_claimed(&env, index)
    }

    /// Anyone may submit a claim; funds always go to the leaf's payee.
    pub fn claim(env: Env, claim: Claim) -> Result<(), Error> {
        process_claim(&env, &claim)
    }

    /// Processes claims in order. Any failing claim reverts the whole batch.
    pub fn batch_claim(env: Env, claims: Vec<Claim>) -> Result<(), Error> {
        for claim in claims.iter() {
            process_claim(&env, &claim)?;
        }
        Ok(())
    }

    /// Funder-only. Sends the contract's remaining token balance to `to`.
    pub fn reclaim_funds(env: Env, to: Address) -> Result<i128, Error> {
        let funder = read_funder(&env)?;
        funder.require_auth();

        let token = read_token(&env)?;
        let client = token::Client::new(&env, &token);
        let contract = env.current_contract_address();
        let balance = client.balance(&contract);
        if balance > 0 {
            client.transfer(&contract, &to, &balance);
        }

        env.events()
            .publish((symbol_short!("reclaim"), to), balance);

        Ok(balance)
    }

    pub fn merkle_root(env: Env) -> Result<BytesN<32>, Error> {
        read_merkle_root(&env)
    }

    pub fn token(env: Env) -> Result<Address, Error> {
        read_token(&env)
    }

    pub fn funder(env: Env) -> Result<Address, Error> {
        read_funder(&env)
    }
}

mod test;
