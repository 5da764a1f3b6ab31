//! End-to-end tests for `FileService` against the OpenDAL memory operator.

use std::sync::Arc;

use lockbox_core::{ActorId, FileId, Permission, SharingState};
use lockbox_crypto::{KdfParams, SealParams};
use lockbox_share::{
    AccessError, AccessOutcome, Catalog, FileService, ManualClock, NewFile, ServiceSettings,
    Target,
};
use lockbox_storage::{memory_operator, BlobStore};
use secrecy::SecretString;
use tempfile::TempDir;

const START: u64 = 1_700_000_000;

fn fast_settings() -> ServiceSettings {
    ServiceSettings {
        seal: SealParams {
            kdf: KdfParams::new(1024, 1, 1),
            chunk_size: 64,
        },
        ..ServiceSettings::default()
    }
}

fn service_with(catalog: Catalog, settings: ServiceSettings) -> (FileService, BlobStore) {
    let blobs = BlobStore::new(memory_operator().expect("memory operator"));
    let clock = Arc::new(ManualClock::new(START));
    let svc = FileService::new(blobs.clone(), catalog, clock, settings);
    (svc, blobs)
}

fn service() -> FileService {
    service_with(Catalog::in_memory(), fast_settings()).0
}

fn pw(s: &str) -> SecretString {
    SecretString::from(s)
}

fn alice() -> ActorId {
    ActorId::new("alice@example.com")
}

fn bob() -> ActorId {
    ActorId::new("bob@example.com")
}

fn hello() -> NewFile {
    NewFile {
        name: "hello.txt".into(),
        content_type: "text/plain".into(),
    }
}

async fn upload_hello(svc: &FileService) -> FileId {
    svc.create_file(&alice(), b"hello world".to_vec(), pw("correct-horse"), hello())
        .await
        .expect("upload")
        .id
}

#[tokio::test]
async fn upload_then_download_with_correct_password() {
    let svc = service();
    let id = upload_hello(&svc).await;

    let outcome = svc
        .read_file(Target::File(id), Some(&alice()), Some(pw("correct-horse")))
        .await
        .unwrap();
    assert_eq!(outcome.content(), Some(&b"hello world"[..]));
}

#[tokio::test]
async fn wrong_password_is_denied_not_garbled() {
    let svc = service();
    let id = upload_hello(&svc).await;

    let result = svc
        .read_file(Target::File(id), Some(&alice()), Some(pw("wrong-password")))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, AccessError::AccessDenied));
    assert_eq!(err.public_message(), AccessError::Forbidden.public_message());
}

#[tokio::test]
async fn owner_without_password_gets_metadata_only() {
    let svc = service();
    let id = upload_hello(&svc).await;

    let outcome = svc
        .read_file(Target::File(id), Some(&alice()), None)
        .await
        .unwrap();
    match outcome {
        AccessOutcome::Metadata(meta) => {
            assert_eq!(meta.name, "hello.txt");
            assert_eq!(meta.size, 11);
            assert_eq!(meta.content_type, "text/plain");
            assert_eq!(meta.owner, alice());
            assert_eq!(meta.sharing, SharingState::Private);
        }
        other => panic!("expected metadata only, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_file_is_not_found() {
    let svc = service();
    let result = svc
        .read_file(Target::File(FileId::generate()), Some(&alice()), None)
        .await;
    assert!(matches!(result, Err(AccessError::NotFound)));
}

#[tokio::test]
async fn stranger_is_forbidden_even_with_password() {
    let svc = service();
    let id = upload_hello(&svc).await;

    let result = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("correct-horse")))
        .await;
    assert!(matches!(result, Err(AccessError::Forbidden)));

    let anonymous = svc.read_file(Target::File(id), None, None).await;
    assert!(matches!(anonymous, Err(AccessError::Forbidden)));
}

#[tokio::test]
async fn grantee_reads_until_revoked() {
    let svc = service();
    let id = upload_hello(&svc).await;

    let grant = svc
        .share(&alice(), &id, &ActorId::new("Bob@Example.com"), Permission::Download)
        .await
        .unwrap();
    assert_eq!(grant.grantee, bob());

    let outcome = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("correct-horse")))
        .await
        .unwrap();
    match outcome {
        AccessOutcome::Content {
            bytes,
            permission,
            metadata,
        } => {
            assert_eq!(bytes, b"hello world");
            assert_eq!(permission, Permission::Download);
            assert_eq!(metadata.sharing, SharingState::SharedWithActors);
        }
        other => panic!("expected content, got {other:?}"),
    }

    let wrong = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("wrong-password")))
        .await;
    assert!(matches!(wrong, Err(AccessError::AccessDenied)));

    svc.revoke(&alice(), &id, &bob()).await.unwrap();
    let after = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("correct-horse")))
        .await;
    assert!(matches!(after, Err(AccessError::Forbidden)));

    let meta = svc.read_file(Target::File(id), Some(&alice()), None).await.unwrap();
    assert_eq!(meta.metadata().sharing, SharingState::Private);
}

#[tokio::test]
async fn reshare_replaces_permission() {
    let svc = service();
    let id = upload_hello(&svc).await;

    svc.share(&alice(), &id, &bob(), Permission::View).await.unwrap();
    svc.share(&alice(), &id, &bob(), Permission::Download).await.unwrap();

    let (grants, links) = svc.shares_of(&alice(), &id).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].permission, Permission::Download);
    assert!(links.is_empty());

    let shared = svc.shared_with(&bob()).await;
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].0.id, id);
    assert_eq!(shared[0].1, Permission::Download);
}

#[tokio::test]
async fn sharing_rules() {
    let svc = service();
    let id = upload_hello(&svc).await;

    let with_self = svc.share(&alice(), &id, &alice(), Permission::View).await;
    assert!(matches!(with_self, Err(AccessError::InvalidInput(_))));

    let carol = ActorId::new("carol@example.com");
    let not_owner = svc.share(&bob(), &id, &carol, Permission::View).await;
    assert!(matches!(not_owner, Err(AccessError::Forbidden)));

    let missing_grant = svc.revoke(&alice(), &id, &carol).await;
    assert!(matches!(missing_grant, Err(AccessError::NotFound)));
}

#[tokio::test]
async fn list_files_and_delete_cascade() {
    let (svc, blobs) = service_with(Catalog::in_memory(), fast_settings());
    let id = upload_hello(&svc).await;
    svc.create_file(
        &bob(),
        b"bob's notes".to_vec(),
        pw("another-secret"),
        NewFile {
            name: "notes.md".into(),
            content_type: "text/markdown".into(),
        },
    )
    .await
    .unwrap();
    svc.share(&alice(), &id, &bob(), Permission::View).await.unwrap();
    let link = svc.create_link(&alice(), &id, None).await.unwrap();

    let mine = svc.list_files(&alice()).await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].sharing, SharingState::LinkShared);
    assert!(blobs.get_payload(&id).await.unwrap().is_some());

    let not_owner = svc.delete_file(&bob(), &id).await;
    assert!(matches!(not_owner, Err(AccessError::Forbidden)));

    svc.delete_file(&alice(), &id).await.unwrap();
    assert!(svc.list_files(&alice()).await.is_empty());
    assert!(svc.shared_with(&bob()).await.is_empty());
    assert_eq!(blobs.get_payload(&id).await.unwrap(), None);
    assert_eq!(blobs.get_wrapped_key(&id).await.unwrap(), None);
    assert_eq!(svc.list_files(&bob()).await.len(), 1);

    let by_link = svc.read_file(Target::Link(link.token), None, None).await;
    assert!(matches!(by_link, Err(AccessError::NotFound)));
}

#[tokio::test]
async fn empty_file_roundtrip() {
    let svc = service();
    let record = svc
        .create_file(&alice(), Vec::new(), pw("correct-horse"), hello())
        .await
        .unwrap();
    assert_eq!(record.size, 0);

    let outcome = svc
        .read_file(Target::File(record.id), Some(&alice()), Some(pw("correct-horse")))
        .await
        .unwrap();
    assert_eq!(outcome.content(), Some(&b""[..]));
}

#[tokio::test]
async fn rejects_empty_password_and_name() {
    let svc = service();
    let no_password = svc
        .create_file(&alice(), b"x".to_vec(), pw(""), hello())
        .await;
    assert!(matches!(no_password, Err(AccessError::InvalidInput(_))));

    let no_name = svc
        .create_file(
            &alice(),
            b"x".to_vec(),
            pw("correct-horse"),
            NewFile {
                name: "   ".into(),
                content_type: "text/plain".into(),
            },
        )
        .await;
    assert!(matches!(no_name, Err(AccessError::InvalidInput(_))));
    assert!(svc.list_files(&alice()).await.is_empty());
}

#[tokio::test]
async fn corrupted_payload_is_denied() {
    let (svc, blobs) = service_with(Catalog::in_memory(), fast_settings());
    let id = upload_hello(&svc).await;

    let mut payload = blobs.get_payload(&id).await.unwrap().unwrap();
    let mid = payload.len() / 2;
    payload[mid] ^= 0x01;
    blobs.put_payload(&id, payload).await.unwrap();

    let result = svc
        .read_file(Target::File(id), Some(&alice()), Some(pw("correct-horse")))
        .await;
    assert!(matches!(result, Err(AccessError::AccessDenied)));
}

#[tokio::test]
async fn missing_blob_is_denied() {
    let (svc, blobs) = service_with(Catalog::in_memory(), fast_settings());
    let id = upload_hello(&svc).await;
    blobs.delete(&id).await.unwrap();

    let meta = svc.read_file(Target::File(id), Some(&alice()), None).await;
    assert!(meta.is_ok());

    let content = svc
        .read_file(Target::File(id), Some(&alice()), Some(pw("correct-horse")))
        .await;
    assert!(matches!(content, Err(AccessError::AccessDenied)));
}

#[tokio::test]
async fn failed_catalog_flush_rolls_back_upload() {
    let tmp = TempDir::new().unwrap();
    // A regular file where the catalog's parent directory should be.
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let catalog = Catalog::open(&blocker.join("catalog.json")).unwrap();

    let op = memory_operator().unwrap();
    let svc = FileService::new(
        BlobStore::new(op.clone()),
        catalog,
        Arc::new(ManualClock::new(START)),
        fast_settings(),
    );
    let result = svc
        .create_file(&alice(), b"hello world".to_vec(), pw("correct-horse"), hello())
        .await;
    assert!(matches!(result, Err(AccessError::Storage(_))));
    assert!(svc.list_files(&alice()).await.is_empty());

    let leftovers = op.list_with("files/").recursive(true).await.unwrap();
    assert!(
        leftovers.iter().all(|e| e.metadata().is_dir()),
        "no blobs may survive a failed upload"
    );
}

/// A service over an on-disk catalog in `tmp/state/`, with one uploaded file.
async fn persisted_service(tmp: &TempDir) -> (FileService, BlobStore, FileId) {
    let catalog = Catalog::open(&tmp.path().join("state/catalog.json")).unwrap();
    let (svc, blobs) = service_with(catalog, fast_settings());
    let id = upload_hello(&svc).await;
    (svc, blobs, id)
}

/// Replace the catalog directory with a regular file so the next flush fails.
fn break_catalog_dir(tmp: &TempDir) {
    let state = tmp.path().join("state");
    std::fs::remove_dir_all(&state).unwrap();
    std::fs::write(&state, b"not a directory").unwrap();
}

#[tokio::test]
async fn failed_flush_leaves_sharing_unchanged() {
    let tmp = TempDir::new().unwrap();
    let (svc, _blobs, id) = persisted_service(&tmp).await;
    break_catalog_dir(&tmp);

    let shared = svc.share(&alice(), &id, &bob(), Permission::Download).await;
    assert!(matches!(shared, Err(AccessError::Storage(_))));
    let linked = svc.create_link(&alice(), &id, None).await;
    assert!(matches!(linked, Err(AccessError::Storage(_))));

    let bob_read = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("correct-horse")))
        .await;
    assert!(matches!(bob_read, Err(AccessError::Forbidden)));
    assert!(svc.shared_with(&bob()).await.is_empty());
    let (grants, links) = svc.shares_of(&alice(), &id).await.unwrap();
    assert!(grants.is_empty());
    assert!(links.is_empty());
    assert_eq!(svc.list_files(&alice()).await[0].sharing, SharingState::Private);
}

#[tokio::test]
async fn failed_flush_keeps_deleted_file() {
    let tmp = TempDir::new().unwrap();
    let (svc, blobs, id) = persisted_service(&tmp).await;
    svc.share(&alice(), &id, &bob(), Permission::View).await.unwrap();
    break_catalog_dir(&tmp);

    let deleted = svc.delete_file(&alice(), &id).await;
    assert!(matches!(deleted, Err(AccessError::Storage(_))));

    assert_eq!(svc.list_files(&alice()).await.len(), 1);
    assert_eq!(svc.shared_with(&bob()).await.len(), 1);
    assert!(blobs.get_payload(&id).await.unwrap().is_some());
    assert!(blobs.get_wrapped_key(&id).await.unwrap().is_some());

    let content = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("correct-horse")))
        .await
        .unwrap();
    assert_eq!(content.content(), Some(&b"hello world"[..]));
}

#[tokio::test]
async fn failed_flush_keeps_grant_on_revoke() {
    let tmp = TempDir::new().unwrap();
    let (svc, _blobs, id) = persisted_service(&tmp).await;
    svc.share(&alice(), &id, &bob(), Permission::View).await.unwrap();
    break_catalog_dir(&tmp);

    let revoked = svc.revoke(&alice(), &id, &bob()).await;
    assert!(matches!(revoked, Err(AccessError::Storage(_))));
    let (grants, _) = svc.shares_of(&alice(), &id).await.unwrap();
    assert_eq!(grants.len(), 1);
}

#[tokio::test]
async fn catalog_persists_across_restart() {
    let tmp = TempDir::new().unwrap();
    let catalog_path = tmp.path().join("catalog.json");
    let blobs = BlobStore::new(memory_operator().unwrap());
    let clock = Arc::new(ManualClock::new(START));

    let id = {
        let svc = FileService::new(
            blobs.clone(),
            Catalog::open(&catalog_path).unwrap(),
            clock.clone(),
            fast_settings(),
        );
        let id = upload_hello(&svc).await;
        svc.share(&alice(), &id, &bob(), Permission::View).await.unwrap();
        id
    };

    let svc = FileService::new(
        blobs,
        Catalog::open(&catalog_path).unwrap(),
        clock,
        fast_settings(),
    );
    let outcome = svc
        .read_file(Target::File(id), Some(&bob()), Some(pw("correct-horse")))
        .await
        .unwrap();
    assert_eq!(outcome.content(), Some(&b"hello world"[..]));
}

#[tokio::test]
async fn concurrent_uploads_get_distinct_records() {
    let svc = Arc::new(service());
    let mut handles = Vec::new();
    for i in 0..8u8 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.create_file(&alice(), vec![i; 100], pw("correct-horse"), hello())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        let record = handle.await.unwrap();
        let outcome = svc
            .read_file(Target::File(record.id), Some(&alice()), Some(pw("correct-horse")))
            .await
            .unwrap();
        assert_eq!(outcome.content().unwrap().len(), 100);
    }
    assert_eq!(svc.list_files(&alice()).await.len(), 8);
}
