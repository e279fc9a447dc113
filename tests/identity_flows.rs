// tests/identity_flows.rs
//! End-to-end flows over the mock chain client and mock proving backend:
//! wallet login via `did:key`, on-chain registration and update, and
//! credential proofs.

use std::sync::Arc;

use serde_json::json;
use zkdid::blockchain::mock::{MockChainClient, MockWalletSigner};
use zkdid::did::key_method;
use zkdid::error::BlockchainError;
use zkdid::zkp::circuits::AGE_VERIFICATION_CIRCUIT_ID;
use zkdid::{
    ChainConfig, DidStatus, MockProvingBackend, OnchainDidOrchestrator, ProofInputs,
    RegisterDidRequest, Service, VerifiableCredential, ZkProofService,
};

const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn age_credential(age: u64) -> VerifiableCredential {
    VerifiableCredential {
        id: "urn:uuid:e2e-age".into(),
        types: vec!["VerifiableCredential".into(), "AgeCredential".into()],
        issuer: "did:key:zIssuer".into(),
        issuance_date: None,
        credential_subject: json!({ "id": "did:key:zHolder", "age": age }),
        proof: None,
        status: None,
        metadata: None,
    }
}

#[test]
fn wallet_login_flow_with_did_key() {
    init_logging();
    let config = ChainConfig::default();

    // The wallet presents an address; the application derives the DID and
    // document without touching the chain.
    let did = key_method::derive_did(&config, ALICE).unwrap();
    let document = key_method::create_did_document(&config, ALICE).unwrap();
    assert!(did.starts_with("did:key:z"));
    assert_eq!(document.id, did);
    assert!(document.has_valid_references());

    // A verifier later resolves the DID back to the same document and
    // recovers the account address.
    let resolved = key_method::resolve(&config, &did).unwrap();
    assert_eq!(resolved, document);
    assert_eq!(key_method::extract_address(&config, &did).unwrap(), ALICE);
}

#[tokio::test]
async fn onchain_did_lifecycle() {
    init_logging();
    let client = Arc::new(MockChainClient::new());
    let orchestrator = OnchainDidOrchestrator::new(client, ChainConfig::default());
    let signer = MockWalletSigner::new(ALICE);

    // Register with a service endpoint in the same atomic call.
    let request = RegisterDidRequest {
        services: vec![Service {
            id: format!("did:substrate:{ALICE}#messaging"),
            service_type: "MessagingService".into(),
            service_endpoint: "https://messages.example".into(),
        }],
        ..Default::default()
    };
    let registered = orchestrator
        .register_did_onchain(request, &signer)
        .await
        .unwrap();
    assert_eq!(registered.status, DidStatus::Active);
    assert_eq!(registered.did_document.service.len(), 1);

    // Duplicate registration loses against the pallet's uniqueness rule.
    let err = orchestrator
        .register_did_onchain(RegisterDidRequest::default(), &signer)
        .await
        .unwrap_err();
    assert!(matches!(err, BlockchainError::DidAlreadyExists { .. }));

    // Revoking via a partial update moves the lifecycle status.
    orchestrator
        .update_did_document(
            &registered.did,
            zkdid::DidDocumentUpdate {
                status: Some(DidStatus::Revoked),
                ..Default::default()
            },
            &signer,
        )
        .await
        .unwrap();
    let document = orchestrator.resolve(&registered.did).await.unwrap();
    assert_eq!(document.chain_metadata.unwrap().status, DidStatus::Revoked);
}

#[tokio::test]
async fn credential_proof_flow() {
    init_logging();
    let service = ZkProofService::with_group_depth(Arc::new(MockProvingBackend), 8);
    let credentials = vec![age_credential(22)];

    let proof = service
        .generate_age_verification_proof(&credentials, Some(18))
        .await
        .unwrap();

    // The verifier computes the expected signal independently and checks
    // the proof against the circuit's group.
    let expected = service
        .expected_signal(
            AGE_VERIFICATION_CIRCUIT_ID,
            &ProofInputs {
                min_age: Some(18),
                group_id: None,
            },
            &credentials[0],
        )
        .unwrap();
    assert!(service.verify_proof(&proof, &expected, Some(AGE_VERIFICATION_CIRCUIT_ID)));

    // Tampering with the expected signal flips verification to false.
    let stricter = service
        .expected_signal(
            AGE_VERIFICATION_CIRCUIT_ID,
            &ProofInputs {
                min_age: Some(30),
                group_id: None,
            },
            &credentials[0],
        )
        .unwrap();
    assert!(!service.verify_proof(&proof, &stricter, None));

    // The proof object round-trips through JSON unchanged.
    let serialized = serde_json::to_string(&proof).unwrap();
    let deserialized: zkdid::ZkProof = serde_json::from_str(&serialized).unwrap();
    assert_eq!(deserialized, proof);
    assert!(service.verify_proof(&deserialized, &expected, None));
}

#[tokio::test]
async fn concurrent_proof_and_resolution() {
    init_logging();
    // Proof generation must not block concurrent DID resolution.
    let client = Arc::new(MockChainClient::new());
    let orchestrator =
        Arc::new(OnchainDidOrchestrator::new(client, ChainConfig::default()));
    let service = Arc::new(ZkProofService::with_group_depth(
        Arc::new(MockProvingBackend),
        8,
    ));
    let signer = MockWalletSigner::new(ALICE);

    let registered = orchestrator
        .register_did_onchain(RegisterDidRequest::default(), &signer)
        .await
        .unwrap();

    let proof_task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .generate_age_verification_proof(&[age_credential(25)], None)
                .await
        })
    };
    let resolve_task = {
        let orchestrator = Arc::clone(&orchestrator);
        let did = registered.did.clone();
        tokio::spawn(async move { orchestrator.resolve(&did).await })
    };

    let (proof, document) = tokio::join!(proof_task, resolve_task);
    assert!(proof.unwrap().is_ok());
    assert!(document.unwrap().is_ok());
}
