//! End-to-end scenarios over the default in-memory collaborators.

use futures::executor::block_on;
use hiveauth::{Auth, AuthConfig, GateIden, MemoryHive, MemoryNexus, Perm, Rule};

fn new_auth() -> Auth<MemoryHive, MemoryNexus> {
    block_on(Auth::new(MemoryHive::root(), MemoryNexus::new(), AuthConfig::default())).unwrap()
}

#[test]
fn prefix_match_allows_a_more_specific_permission() {
    let auth = new_auth();
    block_on(async {
        let alice = auth.add_user("alice").await.unwrap();
        auth.set_user_rules(&alice, vec![Rule::new(true, ["node"])])
            .await
            .unwrap();

        assert_eq!(alice.allowed(&Perm::new(["node", "add", "foo"]), None, None), Some(true));
    });
}

#[test]
fn a_direct_user_rule_beats_a_role_rule() {
    let auth = new_auth();
    block_on(async {
        let ops = auth.add_role("ops").await.unwrap();
        auth.set_role_rules(&ops, vec![Rule::new(false, ["node", "add"])])
            .await
            .unwrap();

        let alice = auth.add_user("alice").await.unwrap();
        auth.grant(&alice, "ops", None).await.unwrap();
        auth.set_user_rules(&alice, vec![Rule::new(true, ["node", "add"])])
            .await
            .unwrap();

        assert_eq!(alice.allowed(&Perm::new(["node", "add"]), None, None), Some(true));
    });
}

#[test]
fn a_role_only_rule_denies_when_the_user_has_no_override() {
    let auth = new_auth();
    block_on(async {
        let ops = auth.add_role("ops").await.unwrap();
        auth.set_role_rules(&ops, vec![Rule::new(false, ["node", "del"])])
            .await
            .unwrap();

        let alice = auth.add_user("alice").await.unwrap();
        auth.grant(&alice, "ops", None).await.unwrap();

        assert_eq!(alice.allowed(&Perm::new(["node", "del"]), Some(true), None), Some(false));
    });
}

#[test]
fn a_gate_overlay_only_applies_when_the_query_is_scoped_to_that_gate() {
    let auth = new_auth();
    block_on(async {
        let gate = auth.add_authgate(GateIden::from_string("doc-1"), "document").await.unwrap();
        let alice = auth.add_user("alice").await.unwrap();
        auth.set_user_gate_rules(&alice, &gate, vec![Rule::new(true, ["doc", "edit"])])
            .await
            .unwrap();

        assert_eq!(
            alice.allowed(&Perm::new(["doc", "edit"]), Some(false), Some(&gate.iden())),
            Some(true)
        );
        assert_eq!(alice.allowed(&Perm::new(["doc", "edit"]), Some(false), None), Some(false));
    });
}

#[test]
fn a_locked_admin_is_still_denied() {
    let auth = new_auth();
    block_on(async {
        let alice = auth.add_user("alice").await.unwrap();
        auth.set_admin(&alice, true).await.unwrap();
        auth.set_locked(&alice, true).await.unwrap();

        assert_eq!(alice.allowed(&Perm::new(["anything"]), None, None), Some(false));
        assert!(alice.confirm(&Perm::new(["anything"]), None, None).is_err());
    });
}

#[test]
fn deleting_a_role_clears_it_from_every_member_and_their_decisions() {
    let auth = new_auth();
    block_on(async {
        let ops = auth.add_role("ops").await.unwrap();
        auth.set_role_rules(&ops, vec![Rule::new(true, ["node", "add"])])
            .await
            .unwrap();

        let alice = auth.add_user("alice").await.unwrap();
        auth.grant(&alice, "ops", None).await.unwrap();
        assert_eq!(alice.allowed(&Perm::new(["node", "add"]), Some(false), None), Some(true));

        auth.del_role(&ops).await.unwrap();

        assert!(!alice.has_role(&ops.iden()));
        assert_eq!(alice.allowed(&Perm::new(["node", "add"]), Some(false), None), Some(false));
    });
}

#[test]
fn gate_scoped_add_rule_lets_one_holder_override_another() {
    let auth = new_auth();
    block_on(async {
        let ops = auth.add_role("ops").await.unwrap();
        let gate = auth.add_authgate(GateIden::from_string("node-1"), "node").await.unwrap();

        let alice = auth.add_user("alice").await.unwrap();
        auth.add_user_gate_rule(&alice, &gate, Rule::new(true, ["node", "add"])).await.unwrap();

        auth.grant(&alice, "ops", None).await.unwrap();
        auth.add_role_gate_rule(&ops, &gate, Rule::new(false, ["node", "del"])).await.unwrap();

        let bob = auth.add_user("bob").await.unwrap();
        auth.add_user_gate_rule(&bob, &gate, Rule::new(true, ["node"])).await.unwrap();

        assert_eq!(
            alice.allowed(&Perm::new(["node", "add"]), Some(false), Some(&gate.iden())),
            Some(true)
        );
        assert_eq!(
            alice.allowed(&Perm::new(["node", "del"]), Some(true), Some(&gate.iden())),
            Some(false)
        );
        assert_eq!(
            bob.allowed(&Perm::new(["node", "del"]), Some(false), Some(&gate.iden())),
            Some(true)
        );
    });
}

#[test]
fn state_round_trips_through_the_underlying_store() {
    let root = MemoryHive::root();
    let iden = block_on(async {
        let auth = Auth::new(root.clone(), MemoryNexus::new(), AuthConfig::default())
            .await
            .unwrap();
        let alice = auth.add_user("alice").await.unwrap();
        auth.set_user_rules(&alice, vec![Rule::new(true, ["node", "add"])])
            .await
            .unwrap();
        auth.grant(&alice, "all", None).await.unwrap();
        alice.iden()
    });

    let reloaded = block_on(async {
        let auth = Auth::new(root, MemoryNexus::new(), AuthConfig::default()).await.unwrap();
        auth.user(&iden).unwrap()
    });

    assert_eq!(reloaded.name(), "alice");
    assert_eq!(reloaded.allowed(&Perm::new(["node", "add"]), None, None), Some(true));
    assert!(reloaded.has_role(&reloaded.role_idens()[0]));
}
