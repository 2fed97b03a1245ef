use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common_types::Variant;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::instrument;

use super::{collect_counts, AssignmentRequest, CounterStore, CounterStoreError};

pub const CONDITION_COUNTS_PREFIX: &str = "condition_counts:";

// KEYS[1] counts hash, ARGV[1] tie seed, ARGV[2] tie break, ARGV[3..] variants in order.
// Same selection as `selection::pick_least_assigned`. Redis runs the whole script
// without interleaving other commands, which makes read-select-increment atomic.
const ASSIGN_SCRIPT: &str = r#"
local seed = tonumber(ARGV[1])
local policy = ARGV[2]
local ties = {}
local min = nil
local total = 0
for i = 3, #ARGV do
    local count = redis.call('HGET', KEYS[1], ARGV[i])
    if not count then
        return false
    end
    count = tonumber(count)
    total = total + count
    if min == nil or count < min then
        min = count
        ties = { ARGV[i] }
    elseif count == min then
        table.insert(ties, ARGV[i])
    end
end
if min == nil then
    return false
end
local index
if policy == 'rotation' then
    index = total % #ties
else
    index = seed % #ties
end
local picked = ties[index + 1]
redis.call('HINCRBY', KEYS[1], picked, 1)
return picked
"#;

pub fn counts_key(experiment_id: &str) -> String {
    format!("{CONDITION_COUNTS_PREFIX}{experiment_id}")
}

/// Counters in one redis hash per experiment, field per variant.
pub struct RedisCounterStore {
    connection: MultiplexedConnection,
    script: Script,
}

impl RedisCounterStore {
    pub async fn new(addr: String, timeout: Duration) -> Result<Self, CounterStoreError> {
        let client = redis::Client::open(addr)?;
        let config = redis::AsyncConnectionConfig::new()
            .set_response_timeout(timeout)
            .set_connection_timeout(timeout);
        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(Self {
            connection,
            script: Script::new(ASSIGN_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    #[instrument(skip_all, fields(experiment_id = request.experiment_id))]
    async fn assign_next(
        &self,
        request: &AssignmentRequest<'_>,
    ) -> Result<Variant, CounterStoreError> {
        let mut conn = self.connection.clone();

        let mut invocation = self.script.key(counts_key(request.experiment_id));
        invocation
            .arg(request.tie_seed)
            .arg(request.tie_break.to_string());
        for variant in request.variants {
            invocation.arg(variant.as_str());
        }

        let picked: Option<String> = invocation.invoke_async(&mut conn).await?;
        let picked =
            picked.ok_or_else(|| CounterStoreError::NotSeeded(request.experiment_id.to_string()))?;

        picked
            .parse::<Variant>()
            .map_err(|_| CounterStoreError::UnknownVariant(picked))
    }

    async fn seed(
        &self,
        experiment_id: &str,
        variants: &[Variant],
    ) -> Result<(), CounterStoreError> {
        let mut conn = self.connection.clone();
        let key = counts_key(experiment_id);
        for variant in variants {
            let _created: bool = conn.hset_nx(&key, variant.as_str(), 0).await?;
        }
        Ok(())
    }

    async fn counts(&self, experiment_id: &str) -> Result<Vec<(Variant, i64)>, CounterStoreError> {
        let mut conn = self.connection.clone();
        let stored: HashMap<String, i64> = conn.hgetall(counts_key(experiment_id)).await?;
        if stored.is_empty() {
            return Ok(vec![]);
        }

        let variants: Vec<Variant> = stored
            .keys()
            .filter_map(|name| name.parse::<Variant>().ok())
            .collect();
        collect_counts(experiment_id, stored, &variants)
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        let mut conn = self.connection.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
