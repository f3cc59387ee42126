//! Contract registry and detail fetches
//!
//! Registration, template assignment and the single block / transaction
//! lookups used outside the paged reports.

use crate::rpc::RpcClient;
use crate::types::{format_address, ContractInfo, NewContract, TemplateChoice};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde_json::Value;
use tracing::info;

/// Last block number persisted by the reporting engine.
pub async fn get_block_number(client: &RpcClient) -> Result<u64> {
    client.get_last_persisted_block_number().await
}

/// All registered contracts with ABI, storage layout and template name.
///
/// Sorted by template name, then address.
pub async fn get_contracts(client: &RpcClient) -> Result<Vec<ContractInfo>> {
    let addresses = client.get_addresses().await?;

    let lookups = addresses.iter().map(|address| async move {
        let (abi, storage_layout, name) = futures::try_join!(
            client.get_abi(*address),
            client.get_storage_abi(*address),
            client.get_contract_template(*address),
        )
        .with_context(|| format!("Failed to fetch details for {}", format_address(address)))?;
        Ok::<_, anyhow::Error>(ContractInfo {
            address: *address,
            abi,
            storage_layout,
            name,
        })
    });

    let mut contracts = try_join_all(lookups).await?;
    contracts.sort_by_cached_key(|c| format!("{}{}", c.name, format_address(&c.address)));
    Ok(contracts)
}

/// Register a contract and assign its template, creating the template first
/// when a new one is supplied.
pub async fn add_contract(client: &RpcClient, contract: &NewContract) -> Result<()> {
    client.add_address(contract.address).await?;

    let template_name = match &contract.template {
        TemplateChoice::Existing(name) => name.as_str(),
        TemplateChoice::New(template) => {
            client.add_template(template).await?;
            template.name.as_str()
        }
    };
    client
        .assign_template(contract.address, template_name)
        .await?;

    info!(
        address = %format_address(&contract.address),
        template = template_name,
        "registered contract"
    );
    Ok(())
}

/// Register several contracts under the same template.
///
/// A new template is created once; later registrations reuse it. Stops at
/// the first failure.
pub async fn import_contracts(
    client: &RpcClient,
    addresses: &[Address],
    template: TemplateChoice,
) -> Result<()> {
    let mut template = template;
    for address in addresses {
        add_contract(
            client,
            &NewContract {
                address: *address,
                template: template.clone(),
            },
        )
        .await
        .with_context(|| format!("Failed to register {}", format_address(address)))?;

        if let TemplateChoice::New(created) = &template {
            template = TemplateChoice::Existing(created.name.clone());
        }
    }
    Ok(())
}

pub async fn delete_contract(client: &RpcClient, address: Address) -> Result<()> {
    client.delete_address(address).await?;
    info!(address = %format_address(&address), "deleted contract");
    Ok(())
}

pub async fn get_templates(client: &RpcClient) -> Result<Vec<String>> {
    client.get_templates().await
}

/// Hash of the transaction that created `address`.
pub async fn get_contract_creation_tx(client: &RpcClient, address: Address) -> Result<String> {
    client.get_contract_creation_transaction(address).await
}

pub async fn get_single_block(client: &RpcClient, block_number: u64) -> Result<Value> {
    client.get_block(block_number).await
}

/// Transaction with its decoded fields merged over the raw fields.
pub async fn get_single_transaction(client: &RpcClient, tx_hash: &str) -> Result<Value> {
    let tx = client.get_transaction(tx_hash).await?;
    Ok(tx.flatten())
}
