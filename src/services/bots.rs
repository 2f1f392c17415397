//! Trading bot configuration records
//!
//! Bots are configuration only: activating one flips `is_active` and
//! nothing else. Trades recorded against a bot feed its performance summary.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::core::domain::bots::{MAX_TRADE_AMOUNT, MAX_TRADE_PRICE};
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{Bot, BotPerformance, BotTemplate, BotTransaction};
use crate::core::validation::{validate_bot, validate_solana_address};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::utils::time::now;

/// Fields for a new bot
#[derive(Debug, Clone, Deserialize)]
pub struct NewBot {
    pub name: String,
    pub strategy: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// Partial bot update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotUpdate {
    pub name: Option<String>,
    pub strategy: Option<String>,
    pub params: Option<Value>,
    /// `Some(None)` clears the address
    #[serde(default, deserialize_with = "present")]
    pub wallet_address: Option<Option<String>>,
}

/// Maps a present field (including `null`) to `Some`, leaving absence as `None`
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Bot CRUD, templates and trade history
#[derive(Debug, Clone)]
pub struct BotService {
    bots: Table<Bot>,
    performance: Table<BotPerformance>,
    transactions: Table<BotTransaction>,
    templates: Table<BotTemplate>,
}

impl BotService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            bots: Table::new(store.clone()),
            performance: Table::new(store.clone()),
            transactions: Table::new(store.clone()),
            templates: Table::new(store),
        }
    }

    /// A user's bots, newest first
    pub async fn list_bots(&self, user_id: &str) -> AppResult<Vec<Bot>> {
        self.bots
            .select(&Query::new().eq("user_id", user_id).order("created_at", true))
            .await
    }

    pub async fn get_bot(&self, bot_id: &str) -> AppResult<Bot> {
        self.bots
            .first(Query::new().eq("id", bot_id))
            .await?
            .ok_or_else(|| AppError::not_found("bot", bot_id))
    }

    /// Create an inactive bot
    #[instrument(skip(self, bot), fields(name = %bot.name, strategy = %bot.strategy))]
    pub async fn create_bot(&self, user_id: &str, bot: NewBot) -> AppResult<Bot> {
        let params = normalize_params(bot.params);
        validate_bot(&bot.name, &bot.strategy, &params)?;
        if let Some(address) = &bot.wallet_address {
            validate_solana_address(address)?;
        }

        let created = self
            .bots
            .insert(&Bot {
                id: None,
                user_id: user_id.to_string(),
                name: bot.name.trim().to_string(),
                strategy: bot.strategy,
                params,
                is_active: false,
                wallet_address: bot.wallet_address,
                created_at: None,
                updated_at: Some(now()),
            })
            .await?;

        info!("🤖 Created bot {} for {}", created.name, user_id);
        Ok(created)
    }

    /// Apply a partial update; the merged bot is validated as a whole
    #[instrument(skip(self, update))]
    pub async fn update_bot(&self, bot_id: &str, update: BotUpdate) -> AppResult<Bot> {
        let current = self.get_bot(bot_id).await?;

        let name = update.name.unwrap_or(current.name);
        let strategy = update.strategy.unwrap_or(current.strategy);
        let params = update.params.map(normalize_params).unwrap_or(current.params);
        validate_bot(&name, &strategy, &params)?;
        if let Some(Some(address)) = &update.wallet_address {
            validate_solana_address(address)?;
        }

        let mut patch = json!({
            "name": name.trim(),
            "strategy": strategy,
            "params": params,
            "updated_at": now(),
        });
        match update.wallet_address {
            Some(Some(address)) => patch["wallet_address"] = Value::String(address),
            Some(None) => patch["wallet_address"] = Value::Null,
            None => {}
        }

        self.patch_bot(bot_id, patch).await
    }

    /// Delete a bot together with its performance and trade rows
    #[instrument(skip(self))]
    pub async fn delete_bot(&self, bot_id: &str) -> AppResult<()> {
        let by_bot = Query::new().eq("bot_id", bot_id);
        let trades = self.transactions.delete(&by_bot).await?;
        self.performance.delete(&by_bot).await?;

        if self.bots.delete(&Query::new().eq("id", bot_id)).await? == 0 {
            return Err(AppError::not_found("bot", bot_id));
        }
        info!("🗑️  Deleted bot {} and {} trade(s)", bot_id, trades);
        Ok(())
    }

    /// Toggle `is_active`
    #[instrument(skip(self))]
    pub async fn set_active(&self, bot_id: &str, active: bool) -> AppResult<Bot> {
        let bot = self
            .patch_bot(bot_id, json!({ "is_active": active, "updated_at": now() }))
            .await?;
        info!("🤖 Bot {} is now {:?}", bot.name, bot.status());
        Ok(bot)
    }

    async fn patch_bot(&self, bot_id: &str, patch: Value) -> AppResult<Bot> {
        self.bots
            .update(&Query::new().eq("id", bot_id), patch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("bot", bot_id))
    }

    pub async fn list_templates(&self) -> AppResult<Vec<BotTemplate>> {
        self.templates.select(&Query::new().order("name", false)).await
    }

    /// Create a bot from a template's strategy and default params
    pub async fn create_from_template(&self, user_id: &str, template_id: &str, name: &str) -> AppResult<Bot> {
        let template = self
            .templates
            .first(Query::new().eq("id", template_id))
            .await?
            .ok_or_else(|| AppError::not_found("bot_template", template_id))?;

        self.create_bot(
            user_id,
            NewBot {
                name: name.to_string(),
                strategy: template.strategy,
                params: template.default_params,
                wallet_address: None,
            },
        )
        .await
    }

    /// Record a trade for an existing bot
    #[instrument(skip(self, trade), fields(bot_id = %trade.bot_id))]
    pub async fn record_transaction(&self, trade: BotTransaction) -> AppResult<BotTransaction> {
        if trade.amount <= Decimal::ZERO || trade.amount > MAX_TRADE_AMOUNT {
            return Err(AppError::invalid_field(
                "amount",
                &trade.amount.to_string(),
                format!("Trade amount must be positive and at most {}", MAX_TRADE_AMOUNT),
            ));
        }
        if trade.price < Decimal::ZERO || trade.price > MAX_TRADE_PRICE {
            return Err(AppError::invalid_field(
                "price",
                &trade.price.to_string(),
                format!("Trade price must be between 0 and {}", MAX_TRADE_PRICE),
            ));
        }
        self.get_bot(&trade.bot_id).await?;

        self.transactions.insert(&trade).await
    }

    /// Most recent trades of a bot
    pub async fn list_transactions(&self, bot_id: &str, limit: usize) -> AppResult<Vec<BotTransaction>> {
        self.transactions
            .select(
                &Query::new()
                    .eq("bot_id", bot_id)
                    .order("created_at", true)
                    .limit(limit),
            )
            .await
    }

    /// Stored performance row, or one computed from the bot's trades
    pub async fn performance(&self, bot_id: &str) -> AppResult<BotPerformance> {
        if let Some(stored) = self.performance.first(Query::new().eq("bot_id", bot_id)).await? {
            return Ok(stored);
        }

        let trades = self.transactions.select(&Query::new().eq("bot_id", bot_id)).await?;
        summarize(bot_id, &trades)
    }
}

fn normalize_params(params: Value) -> Value {
    if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    }
}

/// Performance summary over a set of trades
///
/// `win_rate` is a percentage of trades with positive realised profit.
/// Totals that do not fit a `Decimal` are a validation error.
pub fn summarize(bot_id: &str, trades: &[BotTransaction]) -> AppResult<BotPerformance> {
    let overflow = |what: &str| AppError::validation(format!("{} of bot {} overflows", what, bot_id));

    let total_trades = trades.len() as u64;
    let winning_trades = trades
        .iter()
        .filter(|t| t.profit.is_some_and(|p| p > Decimal::ZERO))
        .count() as u64;

    let mut total_profit = Decimal::ZERO;
    let mut total_volume = Decimal::ZERO;
    for trade in trades {
        if let Some(profit) = trade.profit {
            total_profit = total_profit
                .checked_add(profit)
                .ok_or_else(|| overflow("Total profit"))?;
        }
        let notional = trade
            .amount
            .checked_mul(trade.price)
            .ok_or_else(|| overflow("Trade volume"))?;
        total_volume = total_volume
            .checked_add(notional)
            .ok_or_else(|| overflow("Total volume"))?;
    }

    let win_rate = if total_trades == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(winning_trades) * Decimal::ONE_HUNDRED / Decimal::from(total_trades)).round_dp(2)
    };

    Ok(BotPerformance {
        id: None,
        bot_id: bot_id.to_string(),
        total_trades,
        winning_trades,
        total_profit,
        total_volume,
        win_rate,
        updated_at: Some(now()),
    })
}
