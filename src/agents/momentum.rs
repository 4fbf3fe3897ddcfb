//! Prediction-driven momentum agent
//!
//! One instance per configured market. Each tick it snapshots the book,
//! refreshes its price history, asks the predictor for a directional
//! forecast, and sizes an order toward the forecast when the net edge
//! clears the configured minimum. All risk parameters are applied before a
//! decision leaves `evaluate_market`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::adapters::{BlockchainClient, Predictor};
use crate::agents::TradingAgent;
use crate::analysis::{evaluate_mispricing, realized_volatility, MispricingSignal};
use crate::config::{MarketSettings, RiskParameters};
use crate::coordination::{CancelToken, Clock};
use crate::domain::{AgentState, Decision, Direction, ExecutionResult, MarketState, Order, PricePoint, Side};
use crate::error::{HelmsmanError, Result};

/// Retained history points; pruned harder under memory pressure
const HISTORY_CAP: usize = 500;
const PRUNED_HISTORY_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct MomentumAgentConfig {
    pub market: MarketSettings,
    pub min_confidence: Decimal,
    pub horizon: Duration,
    pub history_lookback: Duration,
}

pub struct MomentumAgent {
    id: String,
    config: MomentumAgentConfig,
    blockchain: Arc<dyn BlockchainClient>,
    predictor: Arc<dyn Predictor>,
    clock: Arc<dyn Clock>,
    state: AgentState,
    history: VecDeque<PricePoint>,
}

impl MomentumAgent {
    pub fn new(
        config: MomentumAgentConfig,
        blockchain: Arc<dyn BlockchainClient>,
        predictor: Arc<dyn Predictor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let id = format!("momentum-{}", config.market.id);
        let state = AgentState::new(id.clone(), clock.now());
        Self {
            id,
            config,
            blockchain,
            predictor,
            clock,
            state,
            history: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    fn risk(&self) -> &RiskParameters {
        &self.config.market.risk
    }

    /// Merge freshly fetched points, newest last, keeping the cap
    fn absorb_history(&mut self, points: Vec<PricePoint>) {
        let newest_held = self.history.back().map(|p| p.timestamp);
        for point in points {
            if newest_held.is_some_and(|held| point.timestamp <= held) {
                continue;
            }
            self.history.push_back(point);
        }
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    /// Turn a mispricing signal into a sized, risk-checked decision
    fn build_decision(
        &self,
        market: &MarketState,
        signal: &MispricingSignal,
        volatility: Decimal,
    ) -> Result<Option<Decision>> {
        let risk = self.risk();

        // Recent realized volatility beyond the slippage budget means fills
        // can't be expected inside the limit band
        if volatility > risk.max_slippage {
            debug!(
                agent_id = %self.id,
                %volatility,
                "volatility exceeds slippage budget, standing down"
            );
            return Ok(None);
        }

        let (side, quantity) = match signal.direction {
            Direction::Up => {
                let headroom = risk.max_position_size - self.state.position.quantity;
                (
                    Side::Buy,
                    self.config.market.max_trade_size.min(headroom),
                )
            }
            Direction::Down => {
                // Spot market: a down forecast can only reduce what we hold
                (
                    Side::Sell,
                    self.config.market.max_trade_size.min(self.state.position.quantity),
                )
            }
        };

        if quantity < self.config.market.min_trade_size || quantity <= Decimal::ZERO {
            return Ok(None);
        }

        let (limit_price, stop_price) = match side {
            Side::Buy => {
                let limit = market.best_ask * (Decimal::ONE + risk.max_slippage);
                let stop = limit * (Decimal::ONE - risk.stop_loss);
                (limit, Some(stop))
            }
            Side::Sell => {
                let limit = market.best_bid * (Decimal::ONE - risk.max_slippage);
                (limit, None)
            }
        };

        let order = Order {
            market_id: self.config.market.id.clone(),
            side,
            quantity,
            limit_price,
            stop_price,
        };

        self.validate_order(&order)?;

        Ok(Some(Decision::new(
            order,
            signal.edge,
            signal.confidence,
            self.clock.now(),
        )))
    }

    /// Final gate: a decision violating risk parameters is rejected, never
    /// executed
    fn validate_order(&self, order: &Order) -> Result<()> {
        let risk = self.risk();

        if order.side == Side::Buy
            && self.state.position.quantity + order.quantity > risk.max_position_size
        {
            return Err(HelmsmanError::Rejected(format!(
                "position {} + {} would exceed max {}",
                self.state.position.quantity, order.quantity, risk.max_position_size
            )));
        }

        if order.quantity > self.config.market.max_trade_size {
            return Err(HelmsmanError::Rejected(format!(
                "quantity {} exceeds max trade size {}",
                order.quantity, self.config.market.max_trade_size
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl TradingAgent for MomentumAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn market_id(&self) -> &str {
        &self.config.market.id
    }

    fn risk_params(&self) -> &RiskParameters {
        &self.config.market.risk
    }

    fn state(&self) -> &AgentState {
        &self.state
    }

    async fn evaluate_market(&mut self, cancel: &CancelToken) -> Result<Option<Decision>> {
        let now = self.clock.now();
        self.state.roll_day(now);

        if self.state.in_cooldown(now) {
            debug!(agent_id = %self.id, until = ?self.state.cooldown_until(), "in cooldown");
            return Ok(None);
        }

        if self.state.trades_today >= self.risk().max_daily_trades {
            debug!(agent_id = %self.id, "daily trade budget spent");
            return Ok(None);
        }

        let market_id = self.config.market.id.clone();
        let market = cancel
            .guard(self.blockchain.get_market_state(&market_id))
            .await??;
        if !market.is_valid() {
            debug!(agent_id = %self.id, "book unusable, skipping tick");
            return Ok(None);
        }

        let points = cancel
            .guard(
                self.blockchain
                    .get_price_history(&market_id, self.config.history_lookback),
            )
            .await??;
        self.absorb_history(points);

        let prediction = match cancel
            .guard(self.predictor.get_prediction(&market_id, self.config.horizon))
            .await?
        {
            Ok(prediction) => prediction,
            Err(HelmsmanError::LowConfidence(reason)) => {
                debug!(agent_id = %self.id, reason = %reason, "prediction declined");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if prediction.confidence < self.config.min_confidence {
            debug!(
                agent_id = %self.id,
                confidence = %prediction.confidence,
                "confidence below floor"
            );
            return Ok(None);
        }

        let Some(signal) = evaluate_mispricing(
            &market,
            &prediction,
            self.config.market.fee_rate,
            self.risk().max_slippage,
            self.config.market.min_edge,
        ) else {
            return Ok(None);
        };

        let volatility = realized_volatility(self.history.make_contiguous());
        self.build_decision(&market, &signal, volatility)
    }

    async fn execute_decision(
        &mut self,
        decision: Decision,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        let outcome = cancel
            .guard(self.blockchain.submit_order(&decision.order))
            .await?;

        match outcome {
            Ok(result) => {
                // State is applied only here, after the submit resolved, with
                // no suspension points in between: a cancelled call leaves
                // the position untouched.
                let now = self.clock.now();
                self.state.record_decision(now);
                let realized = self.state.apply_fill(
                    decision.order.side,
                    result.filled_quantity,
                    result.fill_price,
                );

                if realized < Decimal::ZERO {
                    self.state.record_loss(
                        now,
                        self.risk().cooldown(),
                        self.risk().max_consecutive_losses,
                    );
                } else if realized > Decimal::ZERO {
                    self.state.record_win();
                }

                Ok(result)
            }
            Err(HelmsmanError::Cancelled) => Err(HelmsmanError::Cancelled),
            Err(e) => {
                let now = self.clock.now();
                self.state.record_loss(
                    now,
                    self.risk().cooldown(),
                    self.risk().max_consecutive_losses,
                );
                Err(e)
            }
        }
    }

    fn prune_history(&mut self) {
        while self.history.len() > PRUNED_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockBlockchainClient, MockPredictor};
    use crate::coordination::ManualClock;
    use crate::domain::{Direction, Prediction, PricePoint};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn market_settings() -> MarketSettings {
        MarketSettings {
            id: "inj-usdt".to_string(),
            min_trade_size: dec!(0.1),
            max_trade_size: dec!(5),
            fee_rate: dec!(0.001),
            min_edge: dec!(0.005),
            risk: RiskParameters {
                max_position_size: dec!(10),
                max_slippage: dec!(0.01),
                stop_loss: dec!(0.05),
                max_daily_trades: 10,
                cooldown_secs: 300,
                max_consecutive_losses: 3,
            },
        }
    }

    fn agent_config() -> MomentumAgentConfig {
        MomentumAgentConfig {
            market: market_settings(),
            min_confidence: dec!(0.6),
            horizon: Duration::from_secs(300),
            history_lookback: Duration::from_secs(3600),
        }
    }

    fn market_state() -> MarketState {
        MarketState {
            market_id: "inj-usdt".to_string(),
            best_bid: dec!(99),
            best_ask: dec!(101),
            last_price: dec!(100),
            volume_24h: dec!(10000),
            timestamp: Utc::now(),
        }
    }

    fn prediction(direction: Direction, price: Decimal, confidence: Decimal) -> Prediction {
        Prediction {
            market_id: "inj-usdt".to_string(),
            direction,
            predicted_price: price,
            confidence,
            interval_low: price * dec!(0.98),
            interval_high: price * dec!(1.02),
            timestamp: Utc::now(),
        }
    }

    fn make_agent(blockchain: MockBlockchainClient, predictor: MockPredictor) -> MomentumAgent {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        MomentumAgent::new(
            agent_config(),
            Arc::new(blockchain),
            Arc::new(predictor),
            clock,
        )
    }

    fn happy_collaborators(
        direction: Direction,
        predicted: Decimal,
        confidence: Decimal,
    ) -> (MockBlockchainClient, MockPredictor) {
        let mut blockchain = MockBlockchainClient::new();
        blockchain
            .expect_get_market_state()
            .returning(|_| Ok(market_state()));
        blockchain
            .expect_get_price_history()
            .returning(|_, _| Ok(Vec::<PricePoint>::new()));

        let mut predictor = MockPredictor::new();
        predictor
            .expect_get_prediction()
            .returning(move |_, _| Ok(prediction(direction, predicted, confidence)));

        (blockchain, predictor)
    }

    #[tokio::test]
    async fn test_decision_never_exceeds_position_cap() {
        let (blockchain, predictor) = happy_collaborators(Direction::Up, dec!(110), dec!(0.9));
        let mut agent = make_agent(blockchain, predictor);
        // Nearly full position: only 0.5 of headroom left under the 10 cap
        agent.state.position.quantity = dec!(9.5);
        agent.state.position.entry_price = dec!(95);

        let cancel = CancelToken::detached();
        let decision = agent.evaluate_market(&cancel).await.unwrap().unwrap();

        assert_eq!(decision.order.side, Side::Buy);
        assert_eq!(decision.order.quantity, dec!(0.5));
        assert!(
            agent.state.position.quantity + decision.order.quantity
                <= agent.risk_params().max_position_size
        );
    }

    #[tokio::test]
    async fn test_cooldown_short_circuits_without_collaborator_calls() {
        // Mocks with no expectations panic when invoked
        let blockchain = MockBlockchainClient::new();
        let predictor = MockPredictor::new();
        let mut agent = make_agent(blockchain, predictor);

        let now = agent.clock.now();
        for _ in 0..3 {
            agent
                .state
                .record_loss(now, Duration::from_secs(300), 3);
        }
        assert!(agent.state.in_cooldown(now));

        let cancel = CancelToken::detached();
        let decision = agent.evaluate_market(&cancel).await.unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_daily_budget_short_circuits() {
        let blockchain = MockBlockchainClient::new();
        let predictor = MockPredictor::new();
        let mut agent = make_agent(blockchain, predictor);
        agent.state.trades_today = 10;

        let cancel = CancelToken::detached();
        assert!(agent.evaluate_market(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_low_confidence_produces_no_action() {
        let (blockchain, predictor) = happy_collaborators(Direction::Up, dec!(110), dec!(0.3));
        let mut agent = make_agent(blockchain, predictor);

        let cancel = CancelToken::detached();
        assert!(agent.evaluate_market(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_down_forecast_with_flat_position_is_no_action() {
        let (blockchain, predictor) = happy_collaborators(Direction::Down, dec!(90), dec!(0.9));
        let mut agent = make_agent(blockchain, predictor);

        let cancel = CancelToken::detached();
        assert!(agent.evaluate_market(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_prediction_failure_propagates() {
        let mut blockchain = MockBlockchainClient::new();
        blockchain
            .expect_get_market_state()
            .returning(|_| Ok(market_state()));
        blockchain
            .expect_get_price_history()
            .returning(|_, _| Ok(Vec::<PricePoint>::new()));
        let mut predictor = MockPredictor::new();
        predictor
            .expect_get_prediction()
            .returning(|_, _| Err(HelmsmanError::Transient("rate limited".into())));

        let mut agent = make_agent(blockchain, predictor);
        let cancel = CancelToken::detached();
        let err = agent.evaluate_market(&cancel).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_execute_applies_state_on_success() {
        let mut blockchain = MockBlockchainClient::new();
        blockchain.expect_submit_order().returning(|order| {
            Ok(ExecutionResult {
                order_hash: "0xabc".to_string(),
                filled_quantity: order.quantity,
                fill_price: order.limit_price,
                fee: dec!(0.1),
                timestamp: Utc::now(),
            })
        });
        let predictor = MockPredictor::new();
        let mut agent = make_agent(blockchain, predictor);

        let order = Order {
            market_id: "inj-usdt".to_string(),
            side: Side::Buy,
            quantity: dec!(2),
            limit_price: dec!(102),
            stop_price: None,
        };
        let decision = Decision::new(order, dec!(0.02), dec!(0.9), agent.clock.now());

        let cancel = CancelToken::detached();
        let result = agent.execute_decision(decision, &cancel).await.unwrap();

        assert_eq!(result.filled_quantity, dec!(2));
        assert_eq!(agent.state.position.quantity, dec!(2));
        assert_eq!(agent.state.position.entry_price, dec!(102));
        assert_eq!(agent.state.trades_today, 1);
        assert_eq!(agent.state.consecutive_losses, 0);
    }

    #[tokio::test]
    async fn test_execution_failures_enter_cooldown_at_threshold() {
        let mut blockchain = MockBlockchainClient::new();
        blockchain
            .expect_submit_order()
            .returning(|_| Err(HelmsmanError::Transient("sequence mismatch".into())));
        let predictor = MockPredictor::new();
        let mut agent = make_agent(blockchain, predictor);

        let cancel = CancelToken::detached();
        for _ in 0..3 {
            let order = Order {
                market_id: "inj-usdt".to_string(),
                side: Side::Buy,
                quantity: dec!(1),
                limit_price: dec!(102),
                stop_price: None,
            };
            let decision = Decision::new(order, dec!(0.02), dec!(0.9), agent.clock.now());
            assert!(agent.execute_decision(decision, &cancel).await.is_err());
        }

        assert_eq!(agent.state.consecutive_losses, 3);
        assert!(agent.state.in_cooldown(agent.clock.now()));
        // Position untouched across failed executions
        assert!(agent.state.position.is_flat());
    }

    #[tokio::test]
    async fn test_losing_close_advances_loss_streak() {
        let mut blockchain = MockBlockchainClient::new();
        blockchain.expect_submit_order().returning(|order| {
            Ok(ExecutionResult {
                order_hash: "0xdef".to_string(),
                filled_quantity: order.quantity,
                fill_price: order.limit_price,
                fee: dec!(0.1),
                timestamp: Utc::now(),
            })
        });
        let predictor = MockPredictor::new();
        let mut agent = make_agent(blockchain, predictor);
        agent.state.position.quantity = dec!(2);
        agent.state.position.entry_price = dec!(100);

        // Sell below entry realizes a loss
        let order = Order {
            market_id: "inj-usdt".to_string(),
            side: Side::Sell,
            quantity: dec!(2),
            limit_price: dec!(95),
            stop_price: None,
        };
        let decision = Decision::new(order, dec!(0.02), dec!(0.9), agent.clock.now());

        let cancel = CancelToken::detached();
        agent.execute_decision(decision, &cancel).await.unwrap();

        assert_eq!(agent.state.consecutive_losses, 1);
        assert_eq!(agent.state.realized_pnl, dec!(-10));
    }

    #[tokio::test]
    async fn test_prune_history_keeps_recent_tail() {
        let blockchain = MockBlockchainClient::new();
        let predictor = MockPredictor::new();
        let mut agent = make_agent(blockchain, predictor);

        let base = Utc::now();
        for i in 0..200i64 {
            agent.history.push_back(PricePoint {
                timestamp: base + chrono::Duration::seconds(i),
                price: dec!(100),
                volume: dec!(1),
            });
        }
        agent.prune_history();
        assert_eq!(agent.history.len(), PRUNED_HISTORY_CAP);
        // Oldest entries were evicted first
        assert_eq!(
            agent.history.front().unwrap().timestamp,
            base + chrono::Duration::seconds(150)
        );
    }
}
