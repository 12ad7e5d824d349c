//! VaultSession workflow tests over the in-memory hub.
//!
//! Covers the grant / obtain / revoke lifecycle, the possession requirement
//! for grant and revoke, authentication gating and state transitions.

mod support;

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use vaulthub_client::{
    AccessRecordStore, HubError, MemoryHub, SessionState, UserId, VaultId, VaultSession,
};

#[tokio::test]
async fn new_session_is_unauthenticated() {
    let hub = MemoryHub::default();
    let session = VaultSession::new(
        VaultId::new("vault1"),
        support::logged_in_identity().await,
        Arc::new(hub),
    );
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn authenticate_without_credential_fails() {
    let hub = MemoryHub::default();
    let mut session = VaultSession::new(
        VaultId::new("vault1"),
        support::logged_out_identity(),
        Arc::new(hub),
    );

    let err = session.authenticate().await.unwrap_err();
    assert!(matches!(err, HubError::NotLoggedIn));
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn operations_require_authenticate_first() {
    let hub = MemoryHub::default();
    let (device, keys) = support::new_device("laptop");
    let mut session = VaultSession::new(
        VaultId::new("vault1"),
        support::logged_in_identity().await,
        Arc::new(hub),
    );

    assert!(matches!(session.vault().await, Err(HubError::NotLoggedIn)));
    assert!(matches!(session.members().await, Err(HubError::NotLoggedIn)));
    assert!(matches!(session.register_device(&device).await, Err(HubError::NotLoggedIn)));
    assert!(matches!(
        session.obtain_access(&device.id, &keys).await,
        Err(HubError::NotLoggedIn)
    ));
    assert!(matches!(
        session.create_vault("v", "pw", support::fast_kdf()).await,
        Err(HubError::NotLoggedIn)
    ));
}

#[tokio::test]
async fn create_vault_yields_possession_and_key_obtained() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let mut session = support::session(&hub, &vault_id).await;
    assert_eq!(session.state(), SessionState::Authenticated);

    let possession = session.create_vault("Team", "hunter22", support::fast_kdf()).await.unwrap();
    assert_eq!(possession.vault_id(), &vault_id);
    assert_eq!(session.state(), SessionState::KeyObtained);

    let vault = session.vault().await.unwrap();
    assert_eq!(vault.name, "Team");
    assert!(
        !vault
            .protected_key
            .ciphertext
            .windows(32)
            .any(|w| w == possession.master_key().as_bytes()),
        "stored vault must not contain the plaintext master key"
    );
}

#[tokio::test]
async fn create_existing_vault_conflicts() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let mut first = support::session(&hub, &vault_id).await;
    first.create_vault("A", "pw", support::fast_kdf()).await.unwrap();

    let mut second = support::session(&hub, &vault_id).await;
    let err = second.create_vault("B", "pw", support::fast_kdf()).await.unwrap_err();
    assert!(matches!(err, HubError::Conflict(_)));
}

#[tokio::test]
async fn unlock_with_password_recovers_master_key() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let mut creator = support::session(&hub, &vault_id).await;
    let created = creator.create_vault("Team", "hunter22", support::fast_kdf()).await.unwrap();

    let mut later = support::session(&hub, &vault_id).await;
    let unlocked = later.unlock_with_password("hunter22").await.unwrap();
    assert_eq!(unlocked.master_key().as_bytes(), created.master_key().as_bytes());
    assert_eq!(later.state(), SessionState::KeyObtained);
}

#[tokio::test]
async fn unlock_with_wrong_password_is_denied() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let mut creator = support::session(&hub, &vault_id).await;
    creator.create_vault("Team", "hunter22", support::fast_kdf()).await.unwrap();

    let mut later = support::session(&hub, &vault_id).await;
    let err = later.unlock_with_password("hunter23").await.unwrap_err();
    assert!(matches!(err, HubError::AuthenticationFailure));
    assert_eq!(later.state(), SessionState::AccessDenied);
}

#[tokio::test]
async fn unlock_unknown_vault_is_not_found() {
    let hub = MemoryHub::default();
    let mut session = support::session(&hub, &VaultId::new("nonExistingVault")).await;

    let err = session.unlock_with_password("pw").await.unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
}

#[tokio::test]
async fn grant_obtain_revoke_end_to_end() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device_b, keys_b) = support::new_device("device B");

    // Device A creates the vault and holds M.
    let mut a = support::session(&hub, &vault_id).await;
    let possession_a = a.create_vault("Shared", "pw", support::fast_kdf()).await.unwrap();
    let m = *possession_a.master_key().as_bytes();

    // Device B registers its public key.
    let mut b = support::session(&hub, &vault_id).await;
    b.register_device(&device_b).await.unwrap();

    // A grants B.
    let target = a.device(&device_b.id).await.unwrap();
    a.grant_access_to(&target.id, &possession_a).await.unwrap();
    assert_eq!(a.members().await.unwrap(), BTreeSet::from([device_b.id.clone()]));

    // B recovers exactly M.
    let possession_b = b.obtain_access(&device_b.id, &keys_b).await.unwrap();
    assert_eq!(possession_b.master_key().as_bytes(), &m);
    assert_eq!(b.state(), SessionState::KeyObtained);

    // A revokes B; B is now refused.
    a.revoke_access_to(&device_b.id, &possession_a).await.unwrap();
    let mut b_again = support::session(&hub, &vault_id).await;
    let err = b_again.obtain_access(&device_b.id, &keys_b).await.unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
    assert_eq!(b_again.state(), SessionState::AccessDenied);
}

#[tokio::test]
async fn obtained_key_can_grant_onward() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device_b, keys_b) = support::new_device("B");
    let (device_c, keys_c) = support::new_device("C");

    let mut a = support::session(&hub, &vault_id).await;
    let possession_a = a.create_vault("Shared", "pw", support::fast_kdf()).await.unwrap();
    a.register_device(&device_b).await.unwrap();
    a.register_device(&device_c).await.unwrap();
    a.grant_access_to(&device_b.id, &possession_a).await.unwrap();

    let mut b = support::session(&hub, &vault_id).await;
    let possession_b = b.obtain_access(&device_b.id, &keys_b).await.unwrap();
    b.grant_access_to(&device_c.id, &possession_b).await.unwrap();

    let mut c = support::session(&hub, &vault_id).await;
    let possession_c = c.obtain_access(&device_c.id, &keys_c).await.unwrap();
    assert_eq!(
        possession_c.master_key().as_bytes(),
        possession_a.master_key().as_bytes()
    );
}

#[tokio::test]
async fn grant_without_possession_of_this_vault_is_not_authorized() {
    let hub = MemoryHub::default();
    let (device, _) = support::new_device("target");

    // Caller holds the key of another vault only.
    let mut other = support::session(&hub, &VaultId::new("other")).await;
    let foreign = other.create_vault("Other", "pw", support::fast_kdf()).await.unwrap();
    other.register_device(&device).await.unwrap();

    let mut owner = support::session(&hub, &VaultId::new("vault1")).await;
    owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();

    let mut intruder = support::session(&hub, &VaultId::new("vault1")).await;
    let err = intruder.grant_access_to(&device.id, &foreign).await.unwrap_err();
    assert!(matches!(err, HubError::NotAuthorized(_)), "got {err:?}");

    assert!(matches!(
        hub.get_record(&VaultId::new("vault1"), &device.id).await,
        Err(HubError::NotFound(_))
    ));
    assert_eq!(hub.record_count().await, 0);
}

#[tokio::test]
async fn revoke_without_possession_is_not_authorized() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, _) = support::new_device("target");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();
    owner.register_device(&device).await.unwrap();
    owner.grant_access_to(&device.id, &possession).await.unwrap();

    let mut other = support::session(&hub, &VaultId::new("other")).await;
    let foreign = other.create_vault("Other", "pw", support::fast_kdf()).await.unwrap();

    let mut intruder = support::session(&hub, &vault_id).await;
    let err = intruder.revoke_access_to(&device.id, &foreign).await.unwrap_err();
    assert!(matches!(err, HubError::NotAuthorized(_)));
    assert!(hub.get_record(&vault_id, &device.id).await.is_ok(), "grant must survive");
}

#[tokio::test]
async fn revoke_twice_succeeds() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, _) = support::new_device("target");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();
    owner.register_device(&device).await.unwrap();
    owner.grant_access_to(&device.id, &possession).await.unwrap();

    owner.revoke_access_to(&device.id, &possession).await.unwrap();
    owner.revoke_access_to(&device.id, &possession).await.unwrap();
    assert!(owner.members().await.unwrap().is_empty());
}

#[tokio::test]
async fn obtain_with_wrong_private_key_is_denied() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, _) = support::new_device("target");
    let (_, stolen_keys) = support::new_device("thief");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();
    owner.register_device(&device).await.unwrap();
    owner.grant_access_to(&device.id, &possession).await.unwrap();

    let mut thief = support::session(&hub, &vault_id).await;
    let err = thief.obtain_access(&device.id, &stolen_keys).await.unwrap_err();
    assert!(matches!(err, HubError::AuthenticationFailure));
    assert_eq!(thief.state(), SessionState::AccessDenied);
}

#[tokio::test]
async fn tampered_record_is_denied() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, keys) = support::new_device("target");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();
    owner.register_device(&device).await.unwrap();
    owner.grant_access_to(&device.id, &possession).await.unwrap();

    let mut record = hub.get_record(&vault_id, &device.id).await.unwrap();
    record.wrapped.ciphertext[3] ^= 0x40;
    hub.put_record(&record).await.unwrap();

    let mut session = support::session(&hub, &vault_id).await;
    let err = session.obtain_access(&device.id, &keys).await.unwrap_err();
    assert!(matches!(err, HubError::AuthenticationFailure));
    assert_eq!(session.state(), SessionState::AccessDenied);
}

#[tokio::test]
async fn regrant_replaces_previous_record() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, keys) = support::new_device("target");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();
    owner.register_device(&device).await.unwrap();

    owner.grant_access_to(&device.id, &possession).await.unwrap();
    let first = hub.get_record(&vault_id, &device.id).await.unwrap();
    owner.grant_access_to(&device.id, &possession).await.unwrap();
    let second = hub.get_record(&vault_id, &device.id).await.unwrap();

    assert_ne!(first.wrapped.ephemeral_public_key, second.wrapped.ephemeral_public_key);
    assert_eq!(hub.record_count().await, 1);

    let mut session = support::session(&hub, &vault_id).await;
    let obtained = session.obtain_access(&device.id, &keys).await.unwrap();
    assert_eq!(obtained.master_key().as_bytes(), possession.master_key().as_bytes());
}

#[tokio::test]
async fn logout_mid_session_drops_to_unauthenticated() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let identity = support::logged_in_identity().await;
    let mut session = VaultSession::new(vault_id.clone(), identity.clone(), Arc::new(hub));
    session.authenticate().await.unwrap();
    let possession = session.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();

    identity.logout().await;

    let (device, _) = support::new_device("target");
    let err = session.grant_access_to(&device.id, &possession).await.unwrap_err();
    assert!(matches!(err, HubError::NotLoggedIn));
    assert_eq!(session.state(), SessionState::Unauthenticated);

    // Still refused after the token comes back, until authenticate() again.
    identity.set_tokens("fresh".into(), None).await;
    assert!(matches!(session.members().await, Err(HubError::NotLoggedIn)));
    session.authenticate().await.unwrap();
    assert!(session.members().await.unwrap().is_empty());
}

#[tokio::test]
async fn current_user_and_device_listing() {
    let hub = MemoryHub::new("User Name 1");
    let mut session = support::session(&hub, &VaultId::new("vault1")).await;
    let (laptop, _) = support::new_device("laptop");
    let (phone, _) = support::new_device("phone");

    session.register_device(&laptop).await.unwrap();
    session.register_device(&phone).await.unwrap();

    assert_eq!(session.current_user().await.unwrap(), "User Name 1");
    let mut names: Vec<_> = session.devices().await.unwrap().into_iter().map(|d| d.name).collect();
    names.sort();
    assert_eq!(names, vec!["laptop".to_string(), "phone".to_string()]);
    assert_eq!(
        session.device(&laptop.id).await.unwrap(),
        laptop.with_owner(UserId::new("User Name 1"))
    );
}

#[tokio::test]
async fn registering_a_duplicate_public_key_conflicts() {
    let hub = MemoryHub::default();
    let mut session = support::session(&hub, &VaultId::new("vault1")).await;
    let (laptop, _) = support::new_device("laptop");
    let mut clone = laptop.clone();
    clone.id = vaulthub_client::DeviceId::new("another-install");

    session.register_device(&laptop).await.unwrap();
    let err = session.register_device(&clone).await.unwrap_err();
    assert!(matches!(err, HubError::Conflict(_)));
}

#[tokio::test]
async fn grant_to_unregistered_device_is_not_found() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, _) = support::new_device("never registered");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();

    let err = owner.grant_access_to(&device.id, &possession).await.unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
    assert_eq!(hub.record_count().await, 0);
}

#[tokio::test]
async fn grant_is_allowed_after_a_denied_obtain() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, keys) = support::new_device("target");

    let mut owner = support::session(&hub, &vault_id).await;
    let possession = owner.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();
    owner.register_device(&device).await.unwrap();

    let mut session = support::session(&hub, &vault_id).await;
    assert!(session.obtain_access(&device.id, &keys).await.is_err());
    assert_eq!(session.state(), SessionState::AccessDenied);

    owner.grant_access_to(&device.id, &possession).await.unwrap();
    session.obtain_access(&device.id, &keys).await.unwrap();
    assert_eq!(session.state(), SessionState::KeyObtained);
}

#[tokio::test]
async fn session_logout_requires_reauthentication() {
    let hub = MemoryHub::default();
    let mut session = support::session(&hub, &VaultId::new("vault1")).await;
    session.create_vault("Mine", "pw", support::fast_kdf()).await.unwrap();

    session.logout();
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(matches!(session.vault().await, Err(HubError::NotLoggedIn)));

    session.authenticate().await.unwrap();
    assert_eq!(session.vault().await.unwrap().name, "Mine");
}

#[tokio::test]
async fn device_ids_belong_to_their_registering_user() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (laptop, _) = support::new_device("laptop");
    let (other_key, _) = support::new_device("other");
    let mut hijack = other_key.clone();
    hijack.id = laptop.id.clone();

    let mut alice = support::session_as(&hub, "alice", &vault_id).await;
    alice.register_device(&laptop).await.unwrap();

    let mut mallory = support::session_as(&hub, "mallory", &vault_id).await;
    let err = mallory.register_device(&hijack).await.unwrap_err();
    assert!(matches!(err, HubError::Conflict(_)));
    assert_eq!(alice.device(&laptop.id).await.unwrap().public_key, laptop.public_key);
}

#[tokio::test]
async fn revoke_user_access_removes_all_of_their_devices() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (alice_laptop, _) = support::new_device("alice laptop");
    let (alice_phone, _) = support::new_device("alice phone");
    let (bob_laptop, bob_keys) = support::new_device("bob laptop");

    let mut alice = support::session_as(&hub, "alice", &vault_id).await;
    alice.register_device(&alice_laptop).await.unwrap();
    alice.register_device(&alice_phone).await.unwrap();
    let mut bob = support::session_as(&hub, "bob", &vault_id).await;
    bob.register_device(&bob_laptop).await.unwrap();

    let mut owner = support::session_as(&hub, "owner", &vault_id).await;
    let possession = owner.create_vault("Team", "pw", support::fast_kdf()).await.unwrap();
    for device in [&alice_laptop, &alice_phone, &bob_laptop] {
        owner.grant_access_to(&device.id, &possession).await.unwrap();
    }

    owner.revoke_user_access(&UserId::new("alice"), &possession).await.unwrap();

    assert_eq!(owner.members().await.unwrap(), BTreeSet::from([bob_laptop.id.clone()]));
    bob.obtain_access(&bob_laptop.id, &bob_keys).await.unwrap();

    // Again, and for a user that never had a grant.
    owner.revoke_user_access(&UserId::new("alice"), &possession).await.unwrap();
    owner.revoke_user_access(&UserId::new("nobody"), &possession).await.unwrap();
    assert_eq!(hub.record_count().await, 1);
}

#[tokio::test]
async fn revoke_user_access_needs_possession_of_this_vault() {
    let hub = MemoryHub::default();
    let vault_id = VaultId::new("vault1");
    let (device, _) = support::new_device("alice laptop");

    let mut alice = support::session_as(&hub, "alice", &vault_id).await;
    alice.register_device(&device).await.unwrap();

    let mut owner = support::session_as(&hub, "owner", &vault_id).await;
    let possession = owner.create_vault("Team", "pw", support::fast_kdf()).await.unwrap();
    owner.grant_access_to(&device.id, &possession).await.unwrap();

    let mut other = support::session(&hub, &VaultId::new("other")).await;
    let foreign = other.create_vault("Other", "pw", support::fast_kdf()).await.unwrap();

    let mut intruder = support::session(&hub, &vault_id).await;
    let err = intruder
        .revoke_user_access(&UserId::new("alice"), &foreign)
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NotAuthorized(_)));
    assert_eq!(hub.record_count().await, 1);

    intruder.logout();
    assert!(matches!(
        intruder.revoke_user_access(&UserId::new("alice"), &foreign).await,
        Err(HubError::NotLoggedIn)
    ));
}
