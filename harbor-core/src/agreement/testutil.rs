//! Shared fixtures for the agreement domain tests.

use rst_common::standard::serde_json::{json, Value};

/// Three-condition access template: `lockReward`, `accessSecretStore`, and
/// `escrowReward` depending on the first two
pub(crate) fn access_template_document() -> Value {
    json!({
        "type": "Access",
        "templateId": "0x044852b2a670ade5407e78fb2863c51de9fcb96542a07186fe3aeda6bb8a116d",
        "name": "dataAssetAccessServiceAgreement",
        "creator": "",
        "serviceAgreementTemplate": {
            "contractName": "EscrowAccessSecretStoreTemplate",
            "events": [{
                "name": "AgreementCreated",
                "actorType": "consumer",
                "handler": {
                    "moduleName": "escrowAccessSecretStoreTemplate",
                    "functionName": "fulfillLockRewardCondition",
                    "version": "0.1"
                }
            }],
            "fulfillmentOrder": [
                "lockReward.fulfill",
                "accessSecretStore.fulfill",
                "escrowReward.fulfill"
            ],
            "conditionDependency": {
                "lockReward": [],
                "accessSecretStore": ["lockReward"],
                "escrowReward": ["lockReward", "accessSecretStore"]
            },
            "conditions": [
                {
                    "name": "lockReward",
                    "timelock": 0,
                    "timeout": 0,
                    "contractName": "LockRewardCondition",
                    "functionName": "fulfill",
                    "parameters": [
                        {"name": "_rewardAddress", "type": "address",
                         "value": "0x00bd138abd70e2f00903268f3db08f2d25677c9e"},
                        {"name": "_amount", "type": "uint256", "value": "10"}
                    ],
                    "events": [{
                        "name": "Fulfilled",
                        "actorType": "publisher",
                        "handler": {
                            "moduleName": "lockRewardCondition",
                            "functionName": "fulfillAccessSecretStoreCondition",
                            "version": "0.1"
                        }
                    }]
                },
                {
                    "name": "accessSecretStore",
                    "timelock": 0,
                    "timeout": 0,
                    "contractName": "AccessSecretStoreCondition",
                    "functionName": "fulfill",
                    "parameters": [
                        {"name": "_documentId", "type": "bytes32",
                         "value": "044852b2a670ade5407e78fb2863c51de9fcb96542a07186fe3aeda6bb8a116d"}
                    ],
                    "events": [{
                        "name": "Fulfilled",
                        "actorType": "publisher",
                        "handler": {
                            "moduleName": "accessSecretStore",
                            "functionName": "fulfillEscrowRewardCondition",
                            "version": "0.1"
                        }
                    }],
                    "dependencies": ["lockReward"],
                    "dependencyTimeoutFlags": [0]
                },
                {
                    "name": "escrowReward",
                    "timelock": 0,
                    "timeout": 0,
                    "contractName": "EscrowReward",
                    "functionName": "fulfill",
                    "parameters": [
                        {"name": "_amount", "type": "uint256", "value": "10"}
                    ],
                    "events": [{
                        "name": "Fulfilled",
                        "actorType": "publisher",
                        "handler": {
                            "moduleName": "escrowRewardCondition",
                            "functionName": "verifyRewardTokens",
                            "version": "0.1"
                        }
                    }],
                    "dependencies": ["lockReward", "accessSecretStore"],
                    "dependencyTimeoutFlags": [0, 0]
                }
            ]
        }
    })
}

/// Variant of the access template where `escrowReward` watches the timeout
/// of `accessSecretStore`, which declares an `AccessTimeout` event
pub(crate) fn access_template_with_timeout(timeout: u64) -> Value {
    let mut document = access_template_document();
    let conditions = document["serviceAgreementTemplate"]["conditions"]
        .as_array_mut()
        .unwrap();

    conditions[1]["events"].as_array_mut().unwrap().push(json!({
        "name": "AccessTimeout",
        "actorType": "publisher",
        "handler": {
            "moduleName": "accessSecretStore",
            "functionName": "refundReward",
            "version": "0.1"
        }
    }));

    conditions[2]["timeout"] = json!(timeout);
    conditions[2]["dependencyTimeoutFlags"] = json!([0, 1]);

    document
}
