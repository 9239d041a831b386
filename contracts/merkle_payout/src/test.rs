#![cfg(test)]

extern crate std;

use super::{
    hash_pair, leaf_hash, Claim, Error, MerklePayout, MerklePayoutClient, INSTANCE_TTL_THRESHOLD,
};
use soroban_sdk::{
    symbol_short,
    testutils::{storage::Instance as _, Address as _, Events},
    token::{Client as TokenClient, StellarAssetClient},
    vec, Address, BytesN, Env, InvokeError, Symbol, TryFromVal, Val, Vec,
};
use std::vec::Vec as StdVec;

fn assert_contract_error<T, C>(
    result: Result<Result<T, C>, Result<Error, InvokeError>>,
    expected: Error,
) {
    assert!(matches!(result, Err(Ok(err)) if err == expected));
}

/// Sorted-pair Merkle tree over `(index, payee, amount)` leaves.
/// An odd node at the end of a level is carried up unchanged.
struct PayoutTree {
    levels: StdVec<StdVec<BytesN<32>>>,
}

impl PayoutTree {
    fn build(env: &Env, payouts: &[(Address, i128)]) -> Self {
        let leaves: StdVec<BytesN<32>> = payouts
            .iter()
            .enumerate()
            .map(|(index, (payee, amount))| leaf_hash(env, index as u32, payee, *amount))
            .collect();
        let mut levels = std::vec![leaves];
        while levels.last().unwrap().len() > 1 {
            let next = levels
                .last()
                .unwrap()
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(env, a, b),
                    [a] => a.clone(),
                    _ => unreachable!(),
                })
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    fn root(&self) -> BytesN<32> {
        self.levels.last().unwrap()[0].clone()
    }

    fn proof(&self, env: &Env, index: usize) -> Vec<BytesN<32>> {
        let mut proof = Vec::new(env);
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            if sibling < level.len() {
                proof.push_back(level[sibling].clone());
            }
            position /= 2;
        }
        proof
    }
}

struct Fixture<'a> {
    env: Env,
    funder: Address,
    payees: StdVec<(Address, i128)>,
    tree: PayoutTree,
    token: TokenClient<'a>,
    client: MerklePayoutClient<'a>,
}

impl Fixture<'_> {
    /// (name, second topic, data) of each event this contract published in
    /// the last invocation. Token transfer events are left out.
    fn payout_events(&self) -> StdVec<(Symbol, Val, Val)> {
        self.env
            .events()
            .all()
            .iter()
            .filter(|(contract, _, _)| *contract == self.client.address)
            .map(|(_, topics, data)| {
                let name = Symbol::try_from_val(&self.env, &topics.get(0).unwrap()).unwrap();
                (name, topics.get(1).unwrap(), data)
            })
            .collect()
    }

    /// Decodes a `("claimed", index)` event into (index, payee, amount).
    fn claimed(&self, event: &(Symbol, Val, Val)) -> (u32, Address, i128) {
        let (name, index, data) = event;
        assert_eq!(*name, symbol_short!("claimed"));
        let index = u32::try_from_val(&self.env, index).unwrap();
        let (payee, amount) = <(Address, i128)>::try_from_val(&self.env, data).unwrap();
        (index, payee, amount)
    }

    fn claim_for(&self, index: usize) -> Claim {
        let (payee, amount) = self.payees[index].clone();
        Claim {
            index: index as u32,
            payee,
            amount,
            proof: self.tree.proof(&self.env, index),
        }
    }
}

fn setup(amounts: &[i128], funding: i128) -> Fixture<'static> {
    let env = Env::default();
    env.mock_all_auths();

    let funder = Address::generate(&env);
    let issuer = Address::generate(&env);
    let asset = env.register_stellar_asset_contract_v2(issuer);
    let token = TokenClient::new(&env, &asset.address());

    let payees: StdVec<(Address, i128)> = amounts
        .iter()
        .map(|amount| (Address::generate(&env), *amount))
        .collect();
    let tree = PayoutTree::build(&env, &payees);

    let contract_id = env.register(MerklePayout, ());
    let client = MerklePayoutClient::new(&env, &contract_id);
    client.initialize(&funder, &asset.address(), &tree.root());

    StellarAssetClient::new(&env, &asset.address()).mint(&contract_id, &funding);

    Fixture {
        env,
        funder,
        payees,
        tree,
        token,
        client,
    }
}

#[test]
fn test_initialize_stores_configuration_once() {
    let fx = setup(&[100, 200], 300);

    assert_eq!(fx.client.merkle_root(), fx.tree.root());
    assert_eq!(fx.client.funder(), fx.funder);
    assert_eq!(fx.client.token(), fx.token.address);

    let other_root = BytesN::from_array(&fx.env, &[7; 32]);
    assert_contract_error(
        fx.client
            .try_initialize(&fx.funder, &fx.token.address, &other_root),
        Error::AlreadyInitialized,
    );
    assert_eq!(fx.client.merkle_root(), fx.tree.root());
}

#[test]
fn test_uninitialized_contract_rejects_claims() {
    let env = Env::default();
    let contract_id = env.register(MerklePayout, ());
    let client = MerklePayoutClient::new(&env, &contract_id);

    let claim = Claim {
        index: 0,
        payee: Address::generate(&env),
        amount: 10,
        proof: Vec::new(&env),
    };
    assert_contract_error(client.try_claim(&claim), Error::NotInitialized);
    assert_contract_error(client.try_merkle_root(), Error::NotInitialized);
}

#[test]
fn test_claim_pays_payee_and_sets_bit() {
    let fx = setup(&[100, 250, 75, 40, 5], 470);
    let claim = fx.claim_for(1);

    assert!(!fx.client.is_claimed(&1));
    fx.client.claim(&claim);

    let events = fx.payout_events();
    assert_eq!(events.len(), 1);
    assert_eq!(fx.claimed(&events[0]), (1, claim.payee.clone(), 250));

    assert!(fx.client.is_claimed(&1));
    assert!(!fx.client.is_claimed(&0));
    assert!(!fx.client.is_claimed(&2));
    assert_eq!(fx.token.balance(&claim.payee), 250);
    assert_eq!(fx.token.balance(&fx.client.address), 220);
}

#[test]
fn test_every_leaf_claims_with_odd_tree() {
    let amounts = [10, 20, 30, 40, 50, 60, 70];
    let fx = setup(&amounts, 280);

    for index in 0..amounts.len() {
        fx.client.claim(&fx.claim_for(index));
    }
    for (index, (payee, amount)) in fx.payees.iter().enumerate() {
        assert!(fx.client.is_claimed(&(index as u32)));
        assert_eq!(fx.token.balance(payee), *amount);
    }
    assert_eq!(fx.token.balance(&fx.client.address), 0);
}

#[test]
fn test_single_leaf_tree_has_empty_proof() {
    let fx = setup(&[500], 500);
    let claim = fx.claim_for(0);
    assert_eq!(claim.proof.len(), 0);

    fx.client.claim(&claim);
    assert_eq!(fx.token.balance(&claim.payee), 500);
}

#[test]
fn test_claim_twice_fails() {
    let fx = setup(&[100, 200], 300);
    let claim = fx.claim_for(0);

    fx.client.claim(&claim);
    assert_contract_error(fx.client.try_claim(&claim), Error::AlreadyClaimed);
    assert_eq!(fx.token.balance(&claim.payee), 100);
}

#[test]
fn test_claim_rejects_tampered_leaf() {
    let fx = setup(&[100, 200, 300], 600);

    let mut inflated = fx.claim_for(0);
    inflated.amount = 1_000;
    assert_contract_error(fx.client.try_claim(&inflated), Error::InvalidProof);

    let mut redirected = fx.claim_for(0);
    redirected.payee = Address::generate(&fx.env);
    assert_contract_error(fx.client.try_claim(&redirected), Error::InvalidProof);

    let mut shifted = fx.claim_for(0);
    shifted.index = 1;
    assert_contract_error(fx.client.try_claim(&shifted), Error::InvalidProof);

    let mut short_proof = fx.claim_for(0);
    short_proof.proof.pop_back();
    assert_contract_error(fx.client.try_claim(&short_proof), Error::InvalidProof);

    assert!(!fx.client.is_claimed(&0));
    assert!(!fx.client.is_claimed(&1));
    assert_eq!(fx.token.balance(&fx.client.address), 600);
}

#[test]
fn test_claim_rejects_non_positive_amount() {
    let fx = setup(&[100], 100);
    let mut claim = fx.claim_for(0);
    claim.amount = 0;
    assert_contract_error(fx.client.try_claim(&claim), Error::InvalidAmount);
    claim.amount = -5;
    assert_contract_error(fx.client.try_claim(&claim), Error::InvalidAmount);
}

#[test]
fn test_claimed_bits_span_words() {
    let env = Env::default();
    let contract_id = env.register(MerklePayout, ());

    env.as_contract(&contract_id, || {
        for index in [0_u32, 127, 128, 255, 1_000] {
            super::set_claimed(&env, index);
        }
        for index in [0_u32, 127, 128, 255, 1_000] {
            assert!(super::is_index_claimed(&env, index));
        }
        for index in [1_u32, 126, 129, 256, 999, 1_001] {
            assert!(!super::is_index_claimed(&env, index));
        }
    });
}

#[test]
fn test_batch_claim_pays_all() {
    let fx = setup(&[15, 25, 35, 45], 120);
    let claims = vec![
        &fx.env,
        fx.claim_for(3),
        fx.claim_for(0),
        fx.claim_for(2),
    ];

    fx.client.batch_claim(&claims);

    let claimed: StdVec<_> = fx
        .payout_events()
        .iter()
        .map(|event| fx.claimed(event))
        .collect();
    assert_eq!(
        claimed,
        std::vec![
            (3, fx.payees[3].0.clone(), 45),
            (0, fx.payees[0].0.clone(), 15),
            (2, fx.payees[2].0.clone(), 35),
        ]
    );

    assert!(fx.client.is_claimed(&0));
    assert!(!fx.client.is_claimed(&1));
    assert!(fx.client.is_claimed(&2));
    assert!(fx.client.is_claimed(&3));
    assert_eq!(fx.token.balance(&fx.client.address), 25);
}

#[test]
fn test_batch_claim_is_atomic() {
    let fx = setup(&[15, 25, 35], 75);
    let mut bad = fx.claim_for(2);
    bad.amount = 36;
    let claims = vec![&fx.env, fx.claim_for(0), fx.claim_for(1), bad];

    assert_contract_error(fx.client.try_batch_claim(&claims), Error::InvalidProof);
    assert!(!fx.client.is_claimed(&0));
    assert!(!fx.client.is_claimed(&1));
    assert_eq!(fx.token.balance(&fx.client.address), 75);

    // duplicate index inside one batch
    let claims = vec![&fx.env, fx.claim_for(1), fx.claim_for(1)];
    assert_contract_error(fx.client.try_batch_claim(&claims), Error::AlreadyClaimed);
    assert!(!fx.client.is_claimed(&1));
}

#[test]
fn test_reclaim_funds_returns_balance_to_funder_target() {
    let fx = setup(&[100, 200], 400);
    fx.client.claim(&fx.claim_for(0));

    let treasury = Address::generate(&fx.env);
    let reclaimed = fx.client.reclaim_funds(&treasury);

    let auths = fx.env.auths();
    assert_eq!(auths[0].0, fx.funder);

    let events = fx.payout_events();
    assert_eq!(events.len(), 1);
    let (name, to, data) = &events[0];
    assert_eq!(*name, symbol_short!("reclaim"));
    assert_eq!(Address::try_from_val(&fx.env, to).unwrap(), treasury);
    assert_eq!(i128::try_from_val(&fx.env, data).unwrap(), 300);

    assert_eq!(reclaimed, 300);
    assert_eq!(fx.token.balance(&treasury), 300);
    assert_eq!(fx.token.balance(&fx.client.address), 0);
    assert_eq!(fx.client.reclaim_funds(&treasury), 0);
}

#[test]
fn test_initialize_and_claims_extend_instance_ttl() {
    let fx = setup(&[100, 200], 300);
    let ttl = || {
        fx.env
            .as_contract(&fx.client.address, || fx.env.storage().instance().get_ttl())
    };
    assert!(ttl() >= INSTANCE_TTL_THRESHOLD);

    fx.client.claim(&fx.claim_for(0));
    assert!(ttl() >= INSTANCE_TTL_THRESHOLD);
}
