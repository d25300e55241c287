use std::cell::RefCell;
use std::rc::Rc;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::gate::AuthGate;
use crate::hive::HiveNode;
use crate::ids::{new_guid, GateIden, RoleIden, UserIden};
use crate::nexus::{args_bool, args_str, args_value, NexusArgs, NexusBus, NexusOutcome, NexusValue};
use crate::registry::Registry;
use crate::role::Role;
use crate::rule::{rule_from_nexus, rule_to_nexus, rules_from_nexus, rules_to_nexus, Rule};
use crate::user::{PasswdShadow, User};

/// The well-known name of the coordinator's bootstrap administrator.
pub const ROOT_USER_NAME: &str = "root";

/// The well-known name of the role every user is granted on creation.
pub const ALL_ROLE_NAME: &str = "all";

mod tags {
    pub const USER_ADD: &str = "user:add";
    pub const USER_DEL: &str = "user:del";
    pub const USER_NAME: &str = "user:name";
    pub const USER_INFO: &str = "user:info";
    pub const ROLE_ADD: &str = "role:add";
    pub const ROLE_DEL: &str = "role:del";
    pub const ROLE_NAME: &str = "role:name";
    pub const ROLE_INFO: &str = "role:info";
}

/// Root coordinator (§2): owns the `roles/`, `users/` and `authgates/`
/// subtrees of the supplied [`HiveNode`], bootstraps the `root` user and
/// `all` role, and funnels every replicated mutation through exactly the
/// six tags in [`tags`].
///
/// Not `Send`/`Sync`: its state is reference-counted (`Rc`), matching the
/// single-threaded cooperative concurrency model (§5). Callers embedding
/// this type are responsible for serializing mutation calls onto one
/// task; concurrent reads (`User::allowed`/`User::confirm`) are plain
/// synchronous calls and need no such serialization.
pub struct Auth<H: HiveNode, N: NexusBus> {
    roles_root: H,
    users_root: H,
    gates_root: H,
    nexus: N,
    config: AuthConfig,
    registry: Rc<RefCell<Registry>>,
}

impl<H: HiveNode, N: NexusBus> Auth<H, N> {
    /// Opens (creating if absent) the `roles/`, `users/` and `authgates/`
    /// subtrees under `root`, loads any already-persisted state, registers
    /// the six replicated-mutation handlers, and idempotently bootstraps
    /// the `root` user and `all` role.
    pub async fn new(root: H, nexus: N, config: AuthConfig) -> Result<Self> {
        let roles_root = root.open_child("roles").await?;
        let users_root = root.open_child("users").await?;
        let gates_root = root.open_child("authgates").await?;
        let registry = Rc::new(RefCell::new(Registry::default()));

        register_handlers(
            &nexus,
            &registry,
            &roles_root,
            &users_root,
            &gates_root,
            config.cache_capacity,
        );

        load_roles(&registry, &roles_root).await?;
        load_users(&registry, &users_root, config.cache_capacity).await?;
        load_gates(&registry, &gates_root).await?;

        let auth = Self {
            roles_root,
            users_root,
            gates_root,
            nexus,
            config,
            registry,
        };
        auth.bootstrap().await?;
        Ok(auth)
    }

    async fn bootstrap(&self) -> Result<()> {
        let existing_all = self.registry.borrow().role_by_name(ALL_ROLE_NAME);
        let all_role = match existing_all {
            Some(role) => role,
            None => self.add_role(ALL_ROLE_NAME).await?,
        };
        self.registry.borrow_mut().all_role = Some(all_role.iden());

        let existing_root = self.registry.borrow().user_by_name(ROOT_USER_NAME);
        let root_user = match existing_root {
            Some(user) => user,
            None => self.add_user(ROOT_USER_NAME).await?,
        };
        self.registry.borrow_mut().root_user = Some(root_user.iden());

        self.assert_root_invariants(&root_user).await?;
        Ok(())
    }

    /// Unconditionally re-asserts `root.admin = true` and `root.locked =
    /// false` on every construction, bypassing the replication bus
    /// entirely. A boot-time assertion, not an event: publishing it would
    /// make a follower that both bootstraps and replays the log from
    /// scratch re-apply `user:add root`, which `handle_user_add` rejects
    /// as a duplicate.
    async fn assert_root_invariants(&self, root: &User) -> Result<()> {
        root.set_admin(true);
        root.set_locked(false);
        if let Some(node) = find_child(&self.users_root, root.iden().as_str()).await? {
            let dict = node.dict().await?;
            dict.set("admin", NexusValue::Bool(true)).await?;
            dict.set("locked", NexusValue::Bool(false)).await?;
        }
        Ok(())
    }

    /// The bounded set of decisions memoized per user (§9).
    pub fn config(&self) -> AuthConfig {
        self.config
    }

    // -- lookups -----------------------------------------------------

    pub fn user(&self, iden: &UserIden) -> Option<User> {
        self.registry.borrow().user(iden)
    }

    pub fn user_by_name(&self, name: &str) -> Option<User> {
        self.registry.borrow().user_by_name(name)
    }

    pub fn role(&self, iden: &RoleIden) -> Option<Role> {
        self.registry.borrow().role(iden)
    }

    pub fn role_by_name(&self, name: &str) -> Option<Role> {
        self.registry.borrow().role_by_name(name)
    }

    pub fn gate(&self, iden: &GateIden) -> Option<AuthGate> {
        self.registry.borrow().gate(iden)
    }

    fn require_role(&self, name: &str) -> Result<Role> {
        self.registry
            .borrow()
            .role_by_name(name)
            .ok_or_else(|| Error::no_such_role(name))
    }

    // -- users ---------------------------------------------------------

    pub async fn add_user(&self, name: impl Into<String>) -> Result<User> {
        let name = name.into();
        let outcome = self.nexus.push(tags::USER_ADD, vec![name.into()]).await?;
        let user = outcome.into_user();
        self.grant(&user, ALL_ROLE_NAME, None).await?;
        Ok(user)
    }

    /// Deletes a user. Never the `root` user (`Error::CantDelRootUser`).
    pub async fn del_user(&self, user: &User) -> Result<()> {
        self.nexus
            .push(tags::USER_DEL, vec![user.iden().to_string().into()])
            .await?;
        Ok(())
    }

    pub async fn set_user_name(&self, user: &User, name: impl Into<String>) -> Result<()> {
        self.nexus
            .push(tags::USER_NAME, vec![user.iden().to_string().into(), name.into().into()])
            .await?;
        Ok(())
    }

    pub async fn set_admin(&self, user: &User, admin: bool) -> Result<()> {
        self.push_user_info(user, "admin", vec![admin.into()]).await
    }

    pub async fn set_locked(&self, user: &User, locked: bool) -> Result<()> {
        self.push_user_info(user, "locked", vec![locked.into()]).await
    }

    /// Archiving also locks, per the `active -> locked -> archived`
    /// lifecycle (§4.2); unarchiving does not auto-unlock.
    pub async fn set_archived(&self, user: &User, archived: bool) -> Result<()> {
        self.push_user_info(user, "archived", vec![archived.into()]).await
    }

    pub async fn set_user_rules(&self, user: &User, rules: Vec<Rule>) -> Result<()> {
        self.push_user_info(user, "rules", vec![rules_to_nexus(&rules)]).await
    }

    /// Appends a single rule to `user`'s global rule list (`HiveRuler.addRule`).
    pub async fn add_user_rule(&self, user: &User, rule: Rule) -> Result<()> {
        self.push_user_info(user, "add_rule", vec![rule_to_nexus(&rule)]).await
    }

    /// Removes the first rule equal to `rule` from `user`'s global rule
    /// list (`HiveRuler.delRule`). A no-op if no such rule is present.
    pub async fn del_user_rule(&self, user: &User, rule: Rule) -> Result<()> {
        self.push_user_info(user, "del_rule", vec![rule_to_nexus(&rule)]).await
    }

    /// Appends a single rule to `user`'s rule list on `gate`.
    pub async fn add_user_gate_rule(&self, user: &User, gate: &AuthGate, rule: Rule) -> Result<()> {
        self.push_user_info(
            user,
            "gate_add_rule",
            vec![gate.iden().to_string().into(), rule_to_nexus(&rule)],
        )
        .await
    }

    /// Removes the first rule equal to `rule` from `user`'s rule list on
    /// `gate`. A no-op if no such rule is present.
    pub async fn del_user_gate_rule(&self, user: &User, gate: &AuthGate, rule: Rule) -> Result<()> {
        self.push_user_info(
            user,
            "gate_del_rule",
            vec![gate.iden().to_string().into(), rule_to_nexus(&rule)],
        )
        .await
    }

    /// Grants `role_name` to `user`, inserted at `indx` if given (clamped
    /// to the current list length), or appended otherwise. Idempotent:
    /// already holding the role is not an error. Role order is
    /// decision-significant (§4.2 evaluator steps 5-6 scan in order), so
    /// the index is not cosmetic.
    pub async fn grant(&self, user: &User, role_name: &str, indx: Option<usize>) -> Result<()> {
        let role = self.require_role(role_name)?;
        if user.has_role(&role.iden()) {
            return Ok(());
        }
        let mut roles = user.role_idens();
        let at = indx.unwrap_or(roles.len()).min(roles.len());
        roles.insert(at, role.iden());
        self.push_user_roles(user, roles).await
    }

    /// Revokes `role_name` from `user`. Idempotent. Revoking `"all"` is
    /// always rejected (`Error::CantRevokeAllRole`).
    pub async fn revoke(&self, user: &User, role_name: &str) -> Result<()> {
        if role_name == ALL_ROLE_NAME {
            return Err(Error::CantRevokeAllRole);
        }
        let role = self.require_role(role_name)?;
        if !user.has_role(&role.iden()) {
            return Ok(());
        }
        let mut roles = user.role_idens();
        roles.retain(|r| r != &role.iden());
        self.push_user_roles(user, roles).await
    }

    async fn push_user_roles(&self, user: &User, roles: Vec<RoleIden>) -> Result<()> {
        let encoded = NexusValue::List(roles.iter().map(|r| r.to_string().into()).collect());
        self.push_user_info(user, "roles", vec![encoded]).await
    }

    /// Sets `user`'s password. Rejects an empty string before publishing
    /// anything (`Error::BadArg`).
    pub async fn set_passwd(&self, user: &User, passwd: &str) -> Result<()> {
        if passwd.is_empty() {
            return Err(Error::BadArg("passwd must be a non-empty string".into()));
        }
        let salt = new_guid();
        let hash = PasswdShadow::hash_of(&salt, passwd);
        self.push_user_info(user, "passwd", vec![salt.into(), hash.into()])
            .await
    }

    /// Grants or clears admin on `user`, scoped to `gate`.
    pub async fn set_user_gate_admin(&self, user: &User, gate: &AuthGate, admin: bool) -> Result<()> {
        self.push_user_info(user, "gate_admin", vec![gate.iden().to_string().into(), admin.into()])
            .await
    }

    /// Replaces `user`'s rule list on `gate`.
    pub async fn set_user_gate_rules(&self, user: &User, gate: &AuthGate, rules: Vec<Rule>) -> Result<()> {
        self.push_user_info(
            user,
            "gate_rules",
            vec![gate.iden().to_string().into(), rules_to_nexus(&rules)],
        )
        .await
    }

    async fn push_user_info(&self, user: &User, field: &str, mut rest: NexusArgs) -> Result<()> {
        let mut args = vec![user.iden().to_string().into(), field.into()];
        args.append(&mut rest);
        self.nexus.push(tags::USER_INFO, args).await?;
        Ok(())
    }

    // -- roles -----------------------------------------------------------

    pub async fn add_role(&self, name: impl Into<String>) -> Result<Role> {
        let outcome = self.nexus.push(tags::ROLE_ADD, vec![name.into().into()]).await?;
        Ok(outcome.into_role())
    }

    /// Deletes a role. Never the `all` role (`Error::CantDelAllRole`).
    /// Every user currently holding it has it revoked as part of the same
    /// replicated event.
    pub async fn del_role(&self, role: &Role) -> Result<()> {
        self.nexus
            .push(tags::ROLE_DEL, vec![role.iden().to_string().into()])
            .await?;
        Ok(())
    }

    pub async fn set_role_name(&self, role: &Role, name: impl Into<String>) -> Result<()> {
        self.nexus
            .push(tags::ROLE_NAME, vec![role.iden().to_string().into(), name.into().into()])
            .await?;
        Ok(())
    }

    pub async fn set_role_admin(&self, role: &Role, admin: bool) -> Result<()> {
        self.push_role_info(role, "admin", vec![admin.into()]).await
    }

    pub async fn set_role_rules(&self, role: &Role, rules: Vec<Rule>) -> Result<()> {
        self.push_role_info(role, "rules", vec![rules_to_nexus(&rules)]).await
    }

    /// Appends a single rule to `role`'s global rule list (`HiveRuler.addRule`).
    pub async fn add_role_rule(&self, role: &Role, rule: Rule) -> Result<()> {
        self.push_role_info(role, "add_rule", vec![rule_to_nexus(&rule)]).await
    }

    /// Removes the first rule equal to `rule` from `role`'s global rule
    /// list (`HiveRuler.delRule`). A no-op if no such rule is present.
    pub async fn del_role_rule(&self, role: &Role, rule: Rule) -> Result<()> {
        self.push_role_info(role, "del_rule", vec![rule_to_nexus(&rule)]).await
    }

    /// Appends a single rule to `role`'s rule list on `gate`.
    pub async fn add_role_gate_rule(&self, role: &Role, gate: &AuthGate, rule: Rule) -> Result<()> {
        self.push_role_info(
            role,
            "gate_add_rule",
            vec![gate.iden().to_string().into(), rule_to_nexus(&rule)],
        )
        .await
    }

    /// Removes the first rule equal to `rule` from `role`'s rule list on
    /// `gate`. A no-op if no such rule is present.
    pub async fn del_role_gate_rule(&self, role: &Role, gate: &AuthGate, rule: Rule) -> Result<()> {
        self.push_role_info(
            role,
            "gate_del_rule",
            vec![gate.iden().to_string().into(), rule_to_nexus(&rule)],
        )
        .await
    }

    pub async fn set_role_gate_admin(&self, role: &Role, gate: &AuthGate, admin: bool) -> Result<()> {
        self.push_role_info(role, "gate_admin", vec![gate.iden().to_string().into(), admin.into()])
            .await
    }

    pub async fn set_role_gate_rules(&self, role: &Role, gate: &AuthGate, rules: Vec<Rule>) -> Result<()> {
        self.push_role_info(
            role,
            "gate_rules",
            vec![gate.iden().to_string().into(), rules_to_nexus(&rules)],
        )
        .await
    }

    async fn push_role_info(&self, role: &Role, field: &str, mut rest: NexusArgs) -> Result<()> {
        let mut args = vec![role.iden().to_string().into(), field.into()];
        args.append(&mut rest);
        self.nexus.push(tags::ROLE_INFO, args).await?;
        Ok(())
    }

    // -- authgates ---------------------------------------------------

    /// Creates (or re-opens) the gate for an externally-owned object.
    ///
    /// **Not replicated.** Unlike every other mutation in this file, this
    /// never calls through [`NexusBus::push`] (§4.1): the caller's own
    /// business event that creates the underlying object is what a real
    /// deployment replicates, and the gate is expected to be recreated as
    /// a side effect of replaying that event on every replica. Calling
    /// this only on one replica silently diverges the others.
    pub async fn add_authgate(&self, iden: GateIden, gate_type: impl Into<String>) -> Result<AuthGate> {
        let gate_type = gate_type.into();
        if let Some(existing) = self.registry.borrow().gate(&iden) {
            if existing.gate_type() != gate_type {
                return Err(Error::InconsistentStorage {
                    iden,
                    stored: existing.gate_type(),
                    requested: gate_type,
                });
            }
            return Ok(existing);
        }
        let node = self.gates_root.open_child(iden.as_str()).await?;
        node.set_value(gate_type.clone()).await?;
        let gate = AuthGate::new(iden.clone(), gate_type);
        self.registry.borrow_mut().gates.insert(iden, gate.clone());
        Ok(gate)
    }

    /// Tears down a gate and detaches its overlay from every user and role
    /// that held one, clearing their decision caches.
    ///
    /// **Not replicated**, for the same reason as [`Auth::add_authgate`].
    pub async fn del_authgate(&self, gate: &AuthGate) -> Result<()> {
        for user_iden in gate.user_idens() {
            if let Some(user) = self.registry.borrow().user(&user_iden) {
                gate.revoke_user_overlay(&user);
                user.clear_cache();
            }
        }
        for role_iden in gate.role_idens() {
            if let Some(role) = self.registry.borrow().role(&role_iden) {
                gate.revoke_role_overlay(&role);
                for member in self.registry.borrow().members_of(&role_iden) {
                    member.clear_cache();
                }
            }
        }
        self.registry.borrow_mut().gates.remove(&gate.iden());
        if let Some(node) = find_child(&self.gates_root, gate.iden().as_str()).await? {
            node.pop().await?;
        }
        Ok(())
    }

    /// Scans every user's role list and drops any identifier the registry
    /// no longer has a role for, persisting the pruned list through the
    /// normal `user:info` path so the repair itself is replicated and
    /// replay-safe. Returns the `(user, role)` pairs that were dropped.
    ///
    /// Supplements the dangling-role-reference tolerance this crate
    /// otherwise only logs a warning for (§7, §9): a standing repair
    /// operation, rather than requiring an operator to hand-edit storage.
    pub async fn repair_dangling_roles(&self) -> Result<Vec<(UserIden, RoleIden)>> {
        let users: Vec<User> = self.registry.borrow().users_by_iden.values().cloned().collect();
        let mut dropped = Vec::new();
        for user in users {
            let before = user.role_idens();
            let kept: Vec<RoleIden> = before
                .iter()
                .filter(|iden| self.registry.borrow().role(iden).is_some())
                .cloned()
                .collect();
            if kept.len() != before.len() {
                for iden in before.iter().filter(|iden| !kept.contains(iden)) {
                    dropped.push((user.iden(), iden.clone()));
                }
                self.push_user_roles(&user, kept).await?;
            }
        }
        Ok(dropped)
    }
}

fn register_handlers<H: HiveNode, N: NexusBus>(
    nexus: &N,
    registry: &Rc<RefCell<Registry>>,
    roles_root: &H,
    users_root: &H,
    gates_root: &H,
    cache_capacity: usize,
) {
    let r = registry.clone();
    let root = users_root.clone();
    nexus.register(
        tags::USER_ADD,
        Rc::new(move |args| {
            Box::pin(handle_user_add(r.clone(), root.clone(), cache_capacity, args))
        }),
    );

    let r = registry.clone();
    let root = users_root.clone();
    nexus.register(
        tags::USER_DEL,
        Rc::new(move |args| Box::pin(handle_user_del(r.clone(), root.clone(), args))),
    );

    let r = registry.clone();
    let root = users_root.clone();
    nexus.register(
        tags::USER_NAME,
        Rc::new(move |args| Box::pin(handle_user_name(r.clone(), root.clone(), args))),
    );

    let r = registry.clone();
    let root = users_root.clone();
    let gates = gates_root.clone();
    nexus.register(
        tags::USER_INFO,
        Rc::new(move |args| Box::pin(handle_user_info(r.clone(), root.clone(), gates.clone(), args))),
    );

    let r = registry.clone();
    let root = roles_root.clone();
    nexus.register(
        tags::ROLE_ADD,
        Rc::new(move |args| Box::pin(handle_role_add(r.clone(), root.clone(), args))),
    );

    let r = registry.clone();
    let root = roles_root.clone();
    nexus.register(
        tags::ROLE_DEL,
        Rc::new(move |args| Box::pin(handle_role_del(r.clone(), root.clone(), args))),
    );

    let r = registry.clone();
    let root = roles_root.clone();
    nexus.register(
        tags::ROLE_NAME,
        Rc::new(move |args| Box::pin(handle_role_name(r.clone(), root.clone(), args))),
    );

    let r = registry.clone();
    let root = roles_root.clone();
    let gates = gates_root.clone();
    nexus.register(
        tags::ROLE_INFO,
        Rc::new(move |args| Box::pin(handle_role_info(r.clone(), root.clone(), gates.clone(), args))),
    );
}

/// Opens the child of `root` named `name`, if already materialized.
/// Handlers use this instead of blindly calling `open_child` so a typo'd
/// or already-deleted identifier surfaces as `Error::NoSuchUser`/
/// `Error::NoSuchRole` rather than silently recreating a node.
async fn find_child<H: HiveNode>(root: &H, name: &str) -> Result<Option<H>> {
    Ok(root
        .children()
        .await?
        .into_iter()
        .find(|(child_name, _)| child_name == name)
        .map(|(_, node)| node))
}

async fn handle_user_add<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    users_root: H,
    cache_capacity: usize,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let name = args_str(&args, 0)?;
    if registry.borrow().user_by_name(&name).is_some() {
        return Err(Error::DupUserName(name));
    }
    let iden = UserIden::generate();
    let node = users_root.open_child(iden.as_str()).await?;
    node.set_value(name.clone()).await?;
    let profile = node.open_child("profile").await?.dict().await?;
    let vars = node.open_child("vars").await?.dict().await?;

    let dict = node.dict().await?;
    dict.set("admin", NexusValue::Bool(false)).await?;
    dict.set("locked", NexusValue::Bool(false)).await?;
    dict.set("archived", NexusValue::Bool(false)).await?;
    dict.set("rules", rules_to_nexus(&[])).await?;
    dict.set("roles", NexusValue::List(Vec::new())).await?;

    let user = User::new(iden.clone(), name, profile, vars, Rc::downgrade(&registry), cache_capacity);
    let mut registry = registry.borrow_mut();
    registry.users_by_iden.insert(iden.clone(), user.clone());
    registry.users_by_name.insert(user.name(), iden);
    Ok(NexusOutcome::User(user))
}

async fn handle_user_del<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    users_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let iden = UserIden::from_string(args_str(&args, 0)?);
    let user = registry
        .borrow()
        .user(&iden)
        .ok_or_else(|| Error::no_such_user(&iden))?;
    if registry.borrow().root_user.as_ref() == Some(&iden) {
        return Err(Error::CantDelRootUser);
    }

    for role_iden in user.role_idens() {
        registry.borrow_mut().forget_membership(&role_iden, &iden);
    }
    for gate_iden in user.attached_gate_idens() {
        if let Some(gate) = registry.borrow().gate(&gate_iden) {
            gate.revoke_user_overlay(&user);
        }
    }
    {
        let mut registry = registry.borrow_mut();
        registry.users_by_iden.remove(&iden);
        registry.users_by_name.remove(&user.name());
    }
    if let Some(node) = find_child(&users_root, iden.as_str()).await? {
        node.pop().await?;
    }
    Ok(NexusOutcome::Unit)
}

async fn handle_user_name<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    users_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let iden = UserIden::from_string(args_str(&args, 0)?);
    let new_name = args_str(&args, 1)?;
    let user = registry
        .borrow()
        .user(&iden)
        .ok_or_else(|| Error::no_such_user(&iden))?;
    if registry.borrow().user_by_name(&new_name).is_some() {
        return Err(Error::DupUserName(new_name));
    }
    let old_name = user.name();
    user.set_name(new_name.clone());
    {
        let mut registry = registry.borrow_mut();
        registry.users_by_name.remove(&old_name);
        registry.users_by_name.insert(new_name.clone(), iden.clone());
    }
    if let Some(node) = find_child(&users_root, iden.as_str()).await? {
        node.set_value(new_name).await?;
    }
    Ok(NexusOutcome::Unit)
}

async fn handle_user_info<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    users_root: H,
    gates_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let iden = UserIden::from_string(args_str(&args, 0)?);
    let field = args_str(&args, 1)?;
    let user = registry
        .borrow()
        .user(&iden)
        .ok_or_else(|| Error::no_such_user(&iden))?;
    let node = find_child(&users_root, iden.as_str())
        .await?
        .ok_or_else(|| Error::no_such_user(&iden))?;
    let dict = node.dict().await?;

    match field.as_str() {
        "admin" => {
            let admin = args_bool(&args, 2)?;
            user.set_admin(admin);
            dict.set("admin", NexusValue::Bool(admin)).await?;
            user.clear_cache();
        }
        "locked" => {
            let locked = args_bool(&args, 2)?;
            user.set_locked(locked);
            dict.set("locked", NexusValue::Bool(locked)).await?;
            user.clear_cache();
        }
        "archived" => {
            let archived = args_bool(&args, 2)?;
            user.set_archived(archived);
            dict.set("archived", NexusValue::Bool(archived)).await?;
            if archived {
                user.set_locked(true);
                dict.set("locked", NexusValue::Bool(true)).await?;
            }
            user.clear_cache();
        }
        "rules" => {
            let rules = rules_from_nexus(&args_value(&args, 2)?)?;
            dict.set("rules", rules_to_nexus(&rules)).await?;
            user.set_rules(rules);
            user.clear_cache();
        }
        "add_rule" => {
            let rule = rule_from_nexus(&args_value(&args, 2)?)?;
            user.add_rule(rule, None);
            dict.set("rules", rules_to_nexus(&user.rules(None))).await?;
            user.clear_cache();
        }
        "del_rule" => {
            let rule = rule_from_nexus(&args_value(&args, 2)?)?;
            user.del_rule(&rule, None);
            dict.set("rules", rules_to_nexus(&user.rules(None))).await?;
            user.clear_cache();
        }
        "roles" => {
            let encoded = args_value(&args, 2)?;
            let new_idens: Vec<RoleIden> = encoded
                .as_list()
                .ok_or_else(|| Error::NoSuchImpl("expected a role list".into()))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(RoleIden::from_string)
                        .ok_or_else(|| Error::NoSuchImpl("expected role identifier".into()))
                })
                .collect::<Result<_>>()?;
            let old_idens = user.role_idens();
            dict.set(
                "roles",
                NexusValue::List(new_idens.iter().map(|r| r.to_string().into()).collect()),
            )
            .await?;
            user.set_roles(new_idens.clone());
            {
                let mut registry = registry.borrow_mut();
                for role in old_idens.iter().filter(|r| !new_idens.contains(r)) {
                    registry.forget_membership(role, &iden);
                }
                for role in new_idens.iter().filter(|r| !old_idens.contains(r)) {
                    registry.note_membership(role.clone(), iden.clone());
                }
            }
            user.clear_cache();
        }
        "passwd" => {
            let salt = args_str(&args, 2)?;
            let hash = args_str(&args, 3)?;
            dict.set("passwd_salt", NexusValue::Str(salt.clone())).await?;
            dict.set("passwd_hash", NexusValue::Str(hash.clone())).await?;
            user.apply_passwd_shadow(salt, hash);
        }
        "gate_admin" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let admin = args_bool(&args, 3)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_user_overlay(&user);
            overlay.borrow_mut().admin = admin;
            persist_user_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
            user.clear_cache();
        }
        "gate_rules" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let rules = rules_from_nexus(&args_value(&args, 3)?)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_user_overlay(&user);
            overlay.borrow_mut().rules = rules;
            persist_user_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
            user.clear_cache();
        }
        "gate_add_rule" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let rule = rule_from_nexus(&args_value(&args, 3)?)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_user_overlay(&user);
            overlay.borrow_mut().rules.push(rule);
            persist_user_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
            user.clear_cache();
        }
        "gate_del_rule" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let rule = rule_from_nexus(&args_value(&args, 3)?)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_user_overlay(&user);
            if let Some(pos) = overlay.borrow().rules.iter().position(|r| r == &rule) {
                overlay.borrow_mut().rules.remove(pos);
            }
            persist_user_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
            user.clear_cache();
        }
        other => return Err(Error::NoSuchImpl(format!("unknown user:info field {other:?}"))),
    }
    Ok(NexusOutcome::Unit)
}

async fn persist_user_gate_overlay<H: HiveNode>(
    gates_root: &H,
    gate_iden: &GateIden,
    user_iden: &UserIden,
    overlay: &crate::ruler::SharedOverlay,
) -> Result<()> {
    let gate_node = find_child(gates_root, gate_iden.as_str())
        .await?
        .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
    let user_node = gate_node
        .open_child("users")
        .await?
        .open_child(user_iden.as_str())
        .await?;
    let dict = user_node.dict().await?;
    let overlay = overlay.borrow();
    dict.set("admin", NexusValue::Bool(overlay.admin)).await?;
    dict.set("rules", rules_to_nexus(&overlay.rules)).await?;
    Ok(())
}

async fn persist_role_gate_overlay<H: HiveNode>(
    gates_root: &H,
    gate_iden: &GateIden,
    role_iden: &RoleIden,
    overlay: &crate::ruler::SharedOverlay,
) -> Result<()> {
    let gate_node = find_child(gates_root, gate_iden.as_str())
        .await?
        .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
    let role_node = gate_node
        .open_child("roles")
        .await?
        .open_child(role_iden.as_str())
        .await?;
    let dict = role_node.dict().await?;
    let overlay = overlay.borrow();
    dict.set("admin", NexusValue::Bool(overlay.admin)).await?;
    dict.set("rules", rules_to_nexus(&overlay.rules)).await?;
    Ok(())
}

async fn handle_role_add<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    roles_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let name = args_str(&args, 0)?;
    if registry.borrow().role_by_name(&name).is_some() {
        return Err(Error::DupRoleName(name));
    }
    let iden = RoleIden::generate();
    let node = roles_root.open_child(iden.as_str()).await?;
    node.set_value(name.clone()).await?;
    let dict = node.dict().await?;
    dict.set("admin", NexusValue::Bool(false)).await?;
    dict.set("rules", rules_to_nexus(&[])).await?;

    let role = Role::new(iden.clone(), name);
    let mut registry = registry.borrow_mut();
    registry.roles_by_iden.insert(iden.clone(), role.clone());
    registry.roles_by_name.insert(role.name(), iden);
    Ok(NexusOutcome::Role(role))
}

async fn handle_role_del<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    roles_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let iden = RoleIden::from_string(args_str(&args, 0)?);
    let role = registry
        .borrow()
        .role(&iden)
        .ok_or_else(|| Error::no_such_role(&iden))?;
    if registry.borrow().all_role.as_ref() == Some(&iden) {
        return Err(Error::CantDelAllRole);
    }

    let members = registry.borrow().members_of(&iden);
    for member in &members {
        member.remove_role(&iden);
        member.clear_cache();
    }
    for gate_iden in role.attached_gate_idens() {
        if let Some(gate) = registry.borrow().gate(&gate_iden) {
            gate.revoke_role_overlay(&role);
        }
    }
    {
        let mut registry = registry.borrow_mut();
        registry.roles_by_iden.remove(&iden);
        registry.roles_by_name.remove(&role.name());
        registry.role_members.remove(&iden);
    }
    if let Some(node) = find_child(&roles_root, iden.as_str()).await? {
        node.pop().await?;
    }
    Ok(NexusOutcome::Unit)
}

async fn handle_role_name<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    roles_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let iden = RoleIden::from_string(args_str(&args, 0)?);
    let new_name = args_str(&args, 1)?;
    let role = registry
        .borrow()
        .role(&iden)
        .ok_or_else(|| Error::no_such_role(&iden))?;
    if registry.borrow().role_by_name(&new_name).is_some() {
        return Err(Error::DupRoleName(new_name));
    }
    let old_name = role.name();
    role.set_name(new_name.clone());
    {
        let mut registry = registry.borrow_mut();
        registry.roles_by_name.remove(&old_name);
        registry.roles_by_name.insert(new_name.clone(), iden.clone());
    }
    if let Some(node) = find_child(&roles_root, iden.as_str()).await? {
        node.set_value(new_name).await?;
    }
    Ok(NexusOutcome::Unit)
}

async fn handle_role_info<H: HiveNode>(
    registry: Rc<RefCell<Registry>>,
    roles_root: H,
    gates_root: H,
    args: NexusArgs,
) -> Result<NexusOutcome> {
    let iden = RoleIden::from_string(args_str(&args, 0)?);
    let field = args_str(&args, 1)?;
    let role = registry
        .borrow()
        .role(&iden)
        .ok_or_else(|| Error::no_such_role(&iden))?;
    let node = find_child(&roles_root, iden.as_str())
        .await?
        .ok_or_else(|| Error::no_such_role(&iden))?;
    let dict = node.dict().await?;

    let members = registry.borrow().members_of(&iden);

    match field.as_str() {
        "admin" => {
            let admin = args_bool(&args, 2)?;
            role.set_admin(admin);
            dict.set("admin", NexusValue::Bool(admin)).await?;
        }
        "rules" => {
            let rules = rules_from_nexus(&args_value(&args, 2)?)?;
            dict.set("rules", rules_to_nexus(&rules)).await?;
            role.set_rules(rules);
        }
        "add_rule" => {
            let rule = rule_from_nexus(&args_value(&args, 2)?)?;
            role.add_rule(rule, None);
            dict.set("rules", rules_to_nexus(&role.rules(None))).await?;
        }
        "del_rule" => {
            let rule = rule_from_nexus(&args_value(&args, 2)?)?;
            role.del_rule(&rule, None);
            dict.set("rules", rules_to_nexus(&role.rules(None))).await?;
        }
        "gate_admin" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let admin = args_bool(&args, 3)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_role_overlay(&role);
            overlay.borrow_mut().admin = admin;
            persist_role_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
        }
        "gate_rules" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let rules = rules_from_nexus(&args_value(&args, 3)?)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_role_overlay(&role);
            overlay.borrow_mut().rules = rules;
            persist_role_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
        }
        "gate_add_rule" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let rule = rule_from_nexus(&args_value(&args, 3)?)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_role_overlay(&role);
            overlay.borrow_mut().rules.push(rule);
            persist_role_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
        }
        "gate_del_rule" => {
            let gate_iden = GateIden::from_string(args_str(&args, 2)?);
            let rule = rule_from_nexus(&args_value(&args, 3)?)?;
            let gate = registry
                .borrow()
                .gate(&gate_iden)
                .ok_or_else(|| Error::NoSuchAuthGate(gate_iden.clone()))?;
            let overlay = gate.ensure_role_overlay(&role);
            if let Some(pos) = overlay.borrow().rules.iter().position(|r| r == &rule) {
                overlay.borrow_mut().rules.remove(pos);
            }
            persist_role_gate_overlay(&gates_root, &gate_iden, &iden, &overlay).await?;
        }
        other => return Err(Error::NoSuchImpl(format!("unknown role:info field {other:?}"))),
    }

    for member in members {
        member.clear_cache();
    }
    Ok(NexusOutcome::Unit)
}

async fn load_roles<H: HiveNode>(registry: &Rc<RefCell<Registry>>, roles_root: &H) -> Result<()> {
    for (_, node) in roles_root.children().await? {
        let iden = RoleIden::from_string(node.name());
        let name = node.value().unwrap_or_default();
        let role = Role::new(iden.clone(), name);
        let dict = node.dict().await?;
        if let Some(admin) = dict.get("admin").await.and_then(|v| v.as_bool()) {
            role.set_admin(admin);
        }
        if let Some(rules) = dict.get("rules").await {
            role.set_rules(rules_from_nexus(&rules)?);
        }
        let mut registry = registry.borrow_mut();
        registry.roles_by_iden.insert(iden.clone(), role.clone());
        registry.roles_by_name.insert(role.name(), iden);
    }
    Ok(())
}

async fn load_users<H: HiveNode>(
    registry: &Rc<RefCell<Registry>>,
    users_root: &H,
    cache_capacity: usize,
) -> Result<()> {
    for (_, node) in users_root.children().await? {
        let iden = UserIden::from_string(node.name());
        let name = node.value().unwrap_or_default();
        let profile = node.open_child("profile").await?.dict().await?;
        let vars = node.open_child("vars").await?.dict().await?;
        let user = User::new(iden.clone(), name, profile, vars, Rc::downgrade(registry), cache_capacity);

        let dict = node.dict().await?;
        if let Some(admin) = dict.get("admin").await.and_then(|v| v.as_bool()) {
            user.set_admin(admin);
        }
        if let Some(locked) = dict.get("locked").await.and_then(|v| v.as_bool()) {
            user.set_locked(locked);
        }
        if let Some(archived) = dict.get("archived").await.and_then(|v| v.as_bool()) {
            user.set_archived(archived);
        }
        if let Some(rules) = dict.get("rules").await {
            user.set_rules(rules_from_nexus(&rules)?);
        }
        if let (Some(salt), Some(hash)) = (
            dict.get("passwd_salt").await.and_then(|v| v.as_str().map(str::to_string)),
            dict.get("passwd_hash").await.and_then(|v| v.as_str().map(str::to_string)),
        ) {
            user.apply_passwd_shadow(salt, hash);
        }
        let role_idens: Vec<RoleIden> = match dict.get("roles").await {
            Some(value) => value
                .as_list()
                .unwrap_or(&[])
                .iter()
                .filter_map(|v| v.as_str().map(RoleIden::from_string))
                .collect(),
            None => Vec::new(),
        };
        user.set_roles(role_idens.clone());

        {
            let mut registry = registry.borrow_mut();
            for role_iden in &role_idens {
                if registry.roles_by_iden.contains_key(role_iden) {
                    registry.note_membership(role_iden.clone(), iden.clone());
                } else {
                    tracing::warn!(user = %iden, role = %role_iden, "dangling role reference at load");
                }
            }
            registry.users_by_iden.insert(iden.clone(), user.clone());
            registry.users_by_name.insert(user.name(), iden);
        }
    }
    Ok(())
}

async fn load_gates<H: HiveNode>(registry: &Rc<RefCell<Registry>>, gates_root: &H) -> Result<()> {
    for (_, node) in gates_root.children().await? {
        let iden = GateIden::from_string(node.name());
        let gate_type = node.value().unwrap_or_default();
        let gate = AuthGate::new(iden.clone(), gate_type);

        let users_child = node.open_child("users").await?;
        for (_, user_node) in users_child.children().await? {
            let user_iden = UserIden::from_string(user_node.name());
            let Some(user) = registry.borrow().user(&user_iden) else {
                tracing::warn!(gate = %iden, user = %user_iden, "dangling user overlay reference at load");
                continue;
            };
            let overlay = gate.ensure_user_overlay(&user);
            let dict = user_node.dict().await?;
            if let Some(admin) = dict.get("admin").await.and_then(|v| v.as_bool()) {
                overlay.borrow_mut().admin = admin;
            }
            if let Some(rules) = dict.get("rules").await {
                overlay.borrow_mut().rules = rules_from_nexus(&rules)?;
            }
        }

        let roles_child = node.open_child("roles").await?;
        for (_, role_node) in roles_child.children().await? {
            let role_iden = RoleIden::from_string(role_node.name());
            let Some(role) = registry.borrow().role(&role_iden) else {
                tracing::warn!(gate = %iden, role = %role_iden, "dangling role overlay reference at load");
                continue;
            };
            let overlay = gate.ensure_role_overlay(&role);
            let dict = role_node.dict().await?;
            if let Some(admin) = dict.get("admin").await.and_then(|v| v.as_bool()) {
                overlay.borrow_mut().admin = admin;
            }
            if let Some(rules) = dict.get("rules").await {
                overlay.borrow_mut().rules = rules_from_nexus(&rules)?;
            }
        }

        registry.borrow_mut().gates.insert(iden, gate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_hive::MemoryHive;
    use crate::memory_nexus::MemoryNexus;
    use futures::executor::block_on;

    fn new_auth() -> Auth<MemoryHive, MemoryNexus> {
        block_on(Auth::new(MemoryHive::root(), MemoryNexus::new(), AuthConfig::default())).unwrap()
    }

    #[test]
    fn bootstrap_creates_root_user_and_all_role_exactly_once() {
        let auth = new_auth();
        assert!(auth.user_by_name(ROOT_USER_NAME).is_some());
        assert!(auth.role_by_name(ALL_ROLE_NAME).is_some());

        let root = auth.user_by_name(ROOT_USER_NAME).unwrap();
        assert!(root.is_admin(None));
        assert!(root.has_role(&auth.role_by_name(ALL_ROLE_NAME).unwrap().iden()));
    }

    #[test]
    fn add_user_is_granted_the_all_role_as_a_second_step() {
        let auth = new_auth();
        block_on(async {
            let alice = auth.add_user("alice").await.unwrap();
            let all_role = auth.role_by_name(ALL_ROLE_NAME).unwrap();
            assert!(alice.has_role(&all_role.iden()));
        });
    }

    #[test]
    fn add_user_rejects_a_duplicate_name() {
        let auth = new_auth();
        block_on(async {
            auth.add_user("alice").await.unwrap();
            let err = auth.add_user("alice").await.unwrap_err();
            assert!(matches!(err, Error::DupUserName(_)));
        });
    }

    #[test]
    fn del_user_refuses_to_delete_root() {
        let auth = new_auth();
        block_on(async {
            let root = auth.user_by_name(ROOT_USER_NAME).unwrap();
            let err = auth.del_user(&root).await.unwrap_err();
            assert!(matches!(err, Error::CantDelRootUser));
        });
    }

    #[test]
    fn revoke_all_role_is_rejected() {
        let auth = new_auth();
        block_on(async {
            let alice = auth.add_user("alice").await.unwrap();
            let err = auth.revoke(&alice, ALL_ROLE_NAME).await.unwrap_err();
            assert!(matches!(err, Error::CantRevokeAllRole));
        });
    }

    #[test]
    fn grant_and_revoke_are_idempotent() {
        let auth = new_auth();
        block_on(async {
            let ops = auth.add_role("ops").await.unwrap();
            let alice = auth.add_user("alice").await.unwrap();

            auth.grant(&alice, "ops", None).await.unwrap();
            auth.grant(&alice, "ops", None).await.unwrap();
            assert_eq!(alice.role_idens().iter().filter(|r| **r == ops.iden()).count(), 1);

            auth.revoke(&alice, "ops").await.unwrap();
            auth.revoke(&alice, "ops").await.unwrap();
            assert!(!alice.has_role(&ops.iden()));
        });
    }

    #[test]
    fn grant_inserts_at_the_requested_index() {
        let auth = new_auth();
        block_on(async {
            let ops = auth.add_role("ops").await.unwrap();
            let admins = auth.add_role("admins").await.unwrap();
            let alice = auth.add_user("alice").await.unwrap();

            auth.grant(&alice, "ops", None).await.unwrap();
            let all_role = auth.role_by_name(ALL_ROLE_NAME).unwrap();
            let before = alice.role_idens();
            assert_eq!(before, vec![all_role.iden(), ops.iden()]);

            auth.grant(&alice, "admins", Some(1)).await.unwrap();
            assert_eq!(alice.role_idens(), vec![all_role.iden(), admins.iden(), ops.iden()]);
        });
    }

    #[test]
    fn reconstructing_auth_unconditionally_reasserts_root_invariants() {
        let hive_root = MemoryHive::root();
        {
            let auth = block_on(Auth::new(hive_root.clone(), MemoryNexus::new(), AuthConfig::default())).unwrap();
            block_on(async {
                let root = auth.user_by_name(ROOT_USER_NAME).unwrap();
                auth.set_locked(&root, true).await.unwrap();
            });
        }

        let auth = block_on(Auth::new(hive_root, MemoryNexus::new(), AuthConfig::default())).unwrap();
        let root = auth.user_by_name(ROOT_USER_NAME).unwrap();
        assert!(!root.is_locked());
        assert!(root.is_admin(None));
    }

    #[test]
    fn add_user_rule_then_del_user_rule_round_trips() {
        let auth = new_auth();
        block_on(async {
            let alice = auth.add_user("alice").await.unwrap();
            let rule = Rule::new(true, ["node", "add"]);

            auth.add_user_rule(&alice, rule.clone()).await.unwrap();
            assert_eq!(alice.rules(None), vec![rule.clone()]);

            auth.del_user_rule(&alice, rule).await.unwrap();
            assert!(alice.rules(None).is_empty());
        });
    }

    #[test]
    fn add_role_gate_rule_is_scoped_to_the_gate() {
        let auth = new_auth();
        block_on(async {
            let ops = auth.add_role("ops").await.unwrap();
            let gate = auth.add_authgate(GateIden::from_string("node-1"), "node").await.unwrap();
            let rule = Rule::new(false, ["node", "del"]);

            auth.add_role_gate_rule(&ops, &gate, rule.clone()).await.unwrap();

            assert!(ops.rules(None).is_empty());
            assert_eq!(ops.rules(Some(&gate.iden())), vec![rule]);
        });
    }

    #[test]
    fn add_authgate_detects_a_type_mismatch_on_reopen() {
        let auth = new_auth();
        block_on(async {
            let iden = GateIden::from_string("doc-1");
            auth.add_authgate(iden.clone(), "document").await.unwrap();
            let err = auth.add_authgate(iden, "folder").await.unwrap_err();
            assert!(matches!(err, Error::InconsistentStorage { .. }));
        });
    }

    #[test]
    fn del_authgate_clears_the_overlay_and_the_holders_cache() {
        let auth = new_auth();
        block_on(async {
            let gate = auth.add_authgate(GateIden::from_string("doc-1"), "document").await.unwrap();
            let alice = auth.add_user("alice").await.unwrap();
            auth.set_user_gate_admin(&alice, &gate, true).await.unwrap();
            assert_eq!(alice.allowed(&crate::rule::Perm::new(["x"]), Some(false), Some(&gate.iden())), Some(true));

            auth.del_authgate(&gate).await.unwrap();

            assert!(alice.gate_overlay(&gate.iden()).is_none());
            assert_eq!(alice.allowed(&crate::rule::Perm::new(["x"]), Some(false), Some(&gate.iden())), Some(false));
        });
    }

    #[test]
    fn repair_dangling_roles_prunes_unresolvable_references_and_reports_them() {
        let auth = new_auth();
        block_on(async {
            let alice = auth.add_user("alice").await.unwrap();
            let ghost = RoleIden::generate();
            let mut roles = alice.role_idens();
            roles.push(ghost.clone());
            alice.set_roles(roles);

            let dropped = auth.repair_dangling_roles().await.unwrap();

            assert_eq!(dropped, vec![(alice.iden(), ghost.clone())]);
            assert!(!alice.role_idens().contains(&ghost));
        });
    }
}
