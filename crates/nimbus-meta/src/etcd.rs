use std::sync::Arc;

use anyhow::Result;
use etcd_client::{Client, Compare, CompareOp, GetOptions, Txn, TxnOp};
use tokio::sync::Mutex;

use crate::types::MetaStore;

/// Key namespace used unless [`EtcdMetaStore::with_root`] overrides it.
pub const DEFAULT_ROOT: &str = "/nimbus";

/// etcd-backed store, shared with whatever executor acts on submitted jobs.
///
/// Every key is stored under `root`; callers see keys without it.
#[derive(Clone)]
pub struct EtcdMetaStore {
    client: Arc<Mutex<Client>>,
    root: String,
}

impl EtcdMetaStore {
    pub async fn connect(endpoints: &[String]) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            root: DEFAULT_ROOT.to_string(),
        })
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into().trim_end_matches('/').to_string();
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.root, key)
    }
}

fn revision(header: Option<&etcd_client::ResponseHeader>) -> u64 {
    header.map(|h| h.revision()).unwrap_or_default() as u64
}

#[async_trait::async_trait]
impl MetaStore for EtcdMetaStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        let resp = self
            .client
            .lock()
            .await
            .put(self.full_key(key), value, None)
            .await?;
        Ok(revision(resp.header()))
    }

    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let resp = self.client.lock().await.get(self.full_key(key), None).await?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| (kv.value().to_vec(), kv.mod_revision() as u64)))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>> {
        let resp = self
            .client
            .lock()
            .await
            .get(self.full_key(prefix), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut entries = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv.key_str()?;
            let key = key.strip_prefix(self.root.as_str()).unwrap_or(key);
            entries.push((key.to_string(), kv.value().to_vec(), kv.mod_revision() as u64));
        }
        Ok(entries)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)> {
        let key = self.full_key(key);
        let mut cli = self.client.lock().await;

        // etcd reports mod_revision 0 for a missing key.
        let txn = Txn::new()
            .when([Compare::mod_revision(
                key.as_str(),
                CompareOp::Equal,
                expected_revision as i64,
            )])
            .and_then([TxnOp::put(key.as_str(), value, None)])
            .or_else([TxnOp::get(key.as_str(), None)]);
        let resp = cli.txn(txn).await?;

        if resp.succeeded() {
            return Ok((true, revision(resp.header())));
        }

        let current = resp
            .op_responses()
            .into_iter()
            .find_map(|op| match op {
                etcd_client::TxnOpResponse::Get(get) => {
                    get.kvs().first().map(|kv| kv.mod_revision() as u64)
                }
                _ => None,
            })
            .unwrap_or(0);
        Ok((false, current))
    }
}
