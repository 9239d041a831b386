#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, Address, Env, String, Vec,
};

/// Ledgers a grant entry stays live after a write (~30 days at 5s ledgers).
const GRANT_TTL_EXTEND_TO: u32 = 518_400;
const GRANT_TTL_THRESHOLD: u32 = GRANT_TTL_EXTEND_TO - 17_280;

const INSTANCE_TTL_EXTEND_TO: u32 = 518_400;
const INSTANCE_TTL_THRESHOLD: u32 = INSTANCE_TTL_EXTEND_TO - 17_280;

#[contract]
pub struct GrantRegistry;

/// Pointer to the off-chain metadata describing a grant.
/// `protocol` is opaque to the registry (1 = IPFS by convention).
#[derive(Clone, PartialEq, Eq, Debug)]
#[contracttype]
pub struct MetaPtr {
    pub protocol: u32,
    pub pointer: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
#[contracttype]
pub struct Grant {
    pub id: u32,
    pub owner: Address,
    pub payee: Address,
    pub meta_ptr: MetaPtr,
    pub created_at: u64,
    /// Ledger timestamp of the last create/update; indexers key freshness on it.
    pub last_updated: u64,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    GrantCount,
    Grant(u32),
}

#[contracterror]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Error {
    GrantNotFound = 1,
    InvalidMetaPtr = 2,
    MathOverflow = 3,
}

fn read_grant_count(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&DataKey::GrantCount)
        .unwrap_or(0)
}

fn read_grant(env: &Env, grant_id: u32) -> Result<Grant, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Grant(grant_id))
        .ok_or(Error::GrantNotFound)
}

fn write_grant(env: &Env, grant: &Grant) {
    let key = DataKey::Grant(grant.id);
    env.storage().persistent().set(&key, grant);
    env.storage()
        .persistent()
        .extend_ttl(&key, GRANT_TTL_THRESHOLD, GRANT_TTL_EXTEND_TO);
}

/// Keeps the contract instance (and `GrantCount`) alive as long as the grants.
fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(INSTANCE_TTL_THRESHOLD, INSTANCE_TTL_EXTEND_TO);
}

fn validate_meta_ptr(meta_ptr: &MetaPtr) -> Result<(), Error> {
    if meta_ptr.pointer.len() == 0 {
        return Err(Error::InvalidMetaPtr);
    }
    Ok(())
}

/// Loads a grant and requires its current owner to authorize the call.
fn read_grant_as_owner(env: &Env, grant_id: u32) -> Result<Grant, Error> {
    let grant = read_grant(env, grant_id)?;
    grant.owner.require_auth();
    Ok(grant)
}

fn store_update(env: &Env, mut grant: Grant) -> Grant {
    grant.last_updated = env.ledger().timestamp();
    write_grant(env, &grant);
    extend_instance_ttl(env);
    env.events().publish(
        (symbol_short!("grant"), symbol_short!("updated"), grant.id),
        grant.clone(),
    );
    grant
}

#[contractimpl]
impl GrantRegistry {
    /// Registers a new grant owned by `owner`. Ids are sequential from 0.
    pub fn create_grant(
        env: Env,
        owner: Address,
        payee: Address,
        meta_ptr: MetaPtr,
    ) -> Result<u32, Error> {
        owner.require_auth();
        validate_meta_ptr(&meta_ptr)?;

        let grant_id = read_grant_count(&env);
        let next_count = grant_id.checked_add(1).ok_or(Error::MathOverflow)?;

        let now = env.ledger().timestamp();
        let grant = Grant {
            id: grant_id,
            owner,
            payee,
            meta_ptr,
            created_at: now,
            last_updated: now,
        };

        write_grant(&env, &grant);
        env.storage()
            .instance()
            .set(&DataKey::GrantCount, &next_count);
        extend_instance_ttl(&env);

        env.events().publish(
            (symbol_short!("grant"), symbol_short!("created"), grant_id),
            grant,
        );

        Ok(grant_id)
    }

    /// Replaces every mutable field at once. Requires the current owner.
    pub fn update_grant(
        env: Env,
        grant_id: u32,
        owner: Address,
        payee: Address,
        meta_ptr: MetaPtr,
    ) -> Result<Grant, Error> {
        let mut grant = read_grant_as_owner(&env, grant_id)?;
        validate_meta_ptr(&meta_ptr)?;

        grant.owner = owner;
        grant.payee = payee;
        grant.meta_ptr = meta_ptr;
        Ok(store_update(&env, grant))
    }

    pub fn update_grant_owner(env: Env, grant_id: u32, owner: Address) -> Result<Grant, Error> {
        let mut grant = read_grant_as_owner(&env, grant_id)?;
        grant.owner = owner;
        Ok(store_update(&env, grant))
    }

    pub fn update_grant_payee(env: Env, grant_id: u32, payee: Address) -> Result<Grant, Error> {
        let mut grant = read_grant_as_owner(&env, grant_id)?;
        grant.payee = payee;
        Ok(store_update(&env, grant))
    }

    pub fn update_grant_meta_ptr(
        env: Env,
        grant_id: u32,
        meta_ptr: MetaPtr,
    ) -> Result<Grant, Error> {
        let mut grant = read_grant_as_owner(&env, grant_id)?;
        validate_meta_ptr(&meta_ptr)?;
        grant.meta_ptr = meta_ptr;
        Ok(store_update(&env, grant))
    }

    pub fn get_grant(env: Env, grant_id: u32) -> Result<Grant, Error> {
        read_grant(&env, grant_id)
    }

    pub fn get_grant_count(env: Env) -> u32 {
        read_grant_count(&env)
    }

    /// Every registered grant in id order.
    pub fn get_all_grants(env: Env) -> Result<Vec<Grant>, Error> {
        let mut grants = Vec::new(&env);
        for grant_id in 0..read_grant_count(&env) {
            grants.push_back(read_grant(&env, grant_id)?);
        }
        Ok(grants)
    }
}
