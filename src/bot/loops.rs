//! The five periodic control loops.
//!
//! Every loop runs one unit of work, then sleeps for its interval (or its
//! backoff after a failed cycle). Sleeps race the shutdown token, so a
//! requested shutdown ends each loop after its in-flight unit. Cycle
//! failures are logged, recorded as `"<loop>: <error>"`, and never end the
//! loop.

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::initializer::Components;
use super::status::{METRIC_DAILY_LOSS_WARNINGS, METRIC_DRAWDOWN_WARNINGS};
use super::{bounded, BotInner, DRAWDOWN_REASON};
use crate::coordination::{DrawdownLevel, LifecycleState, ShutdownToken};
use crate::error::{Result, VigilError};
use crate::supervisor::ReconnectionManager;

pub(crate) const MARKET_SCANNER: &str = "market_scanner";
pub(crate) const STRATEGY: &str = "strategy";
pub(crate) const RISK_MONITOR: &str = "risk_monitor";
pub(crate) const PERFORMANCE: &str = "performance_tracker";
pub(crate) const HEALTH_CHECK: &str = "health_check";

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Sleep for `period` unless shutdown is requested first. Returns false
/// when the loop should exit.
async fn idle(token: &mut ShutdownToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

fn cycle_failed(bot: &BotInner, unit: &str, e: &VigilError) {
    error!(unit, error = %e, "cycle failed");
    bot.status.record_error(format!("{unit}: {e}"));
}

/// Run `cycle` until shutdown, sleeping `interval` after a good cycle and
/// `backoff` after a failed one
async fn run_periodic<F, Fut>(
    bot: Arc<BotInner>,
    mut token: ShutdownToken,
    unit: &'static str,
    interval: Duration,
    backoff: Duration,
    mut cycle: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    info!(unit, interval_secs = interval.as_secs(), "loop started");
    while !token.is_cancelled() {
        let period = match cycle().await {
            Ok(()) => interval,
            Err(e) => {
                cycle_failed(&bot, unit, &e);
                backoff
            }
        };
        if !idle(&mut token, period).await {
            break;
        }
    }
    info!(unit, "loop stopped");
    Ok(())
}

pub(crate) async fn market_scanner(
    bot: Arc<BotInner>,
    c: Components,
    token: ShutdownToken,
) -> Result<()> {
    let limit = bot.config.loops.call_timeout();
    let interval = secs(bot.config.trading.scan_interval_secs);
    let backoff = secs(bot.config.loops.scanner_backoff_secs);

    run_periodic(bot, token, MARKET_SCANNER, interval, backoff, || {
        let c = c.clone();
        async move {
            debug!("scanning market");
            let watchlist = bounded("watchlist update", limit, c.scanner.update_watchlist()).await?;
            bounded("market data refresh", limit, c.market_data.update_all()).await?;
            debug!(pairs = watchlist.len(), "market scan complete");
            Ok(())
        }
    })
    .await
}

pub(crate) async fn strategy(
    bot: Arc<BotInner>,
    c: Components,
    token: ShutdownToken,
) -> Result<()> {
    let limit = bot.config.loops.call_timeout();
    let interval = secs(bot.config.strategy.interval_secs);
    let backoff = secs(bot.config.loops.strategy_backoff_secs);
    let shared = bot.clone();

    run_periodic(bot, token, STRATEGY, interval, backoff, || {
        let c = c.clone();
        let bot = shared.clone();
        async move {
            bounded("pair market data update", limit, c.pairs.update_market_data()).await?;
            let signals = bounded("signal check", limit, c.pairs.check_signals()).await?;

            if !signals.is_empty() {
                let state = bot.status.state();
                if state.can_trade() {
                    info!(count = signals.len(), "signals detected");
                    bounded("signal execution", limit, c.pairs.execute_signals(signals)).await?;
                } else {
                    info!(count = signals.len(), %state, "signals held back, trading not active");
                }
            }

            bot.status.set_open_positions(c.pairs.positions().len());
            Ok(())
        }
    })
    .await
}

pub(crate) async fn risk_monitor(
    bot: Arc<BotInner>,
    c: Components,
    token: ShutdownToken,
) -> Result<()> {
    let interval = secs(bot.config.loops.risk_interval_secs);
    let backoff = secs(bot.config.loops.risk_backoff_secs);
    let shared = bot.clone();

    run_periodic(bot, token, RISK_MONITOR, interval, backoff, || {
        let c = c.clone();
        let bot = shared.clone();
        async move { risk_cycle(&bot, &c).await }
    })
    .await
}

/// One risk monitor pass: breaker evaluation, then trailing stops
pub(crate) async fn risk_cycle(bot: &Arc<BotInner>, c: &Components) -> Result<()> {
    let capital = bot.config.trading.initial_balance;
    let snapshot = c.risk.risk_snapshot(capital)?;
    let verdict = bot.breaker.evaluate(snapshot);

    match verdict.drawdown {
        DrawdownLevel::Normal => {}
        DrawdownLevel::Warning => {
            warn!(drawdown = %snapshot.current_drawdown, "drawdown above warning threshold");
            bot.status.increment_metric(METRIC_DRAWDOWN_WARNINGS, 1);
        }
        DrawdownLevel::Critical => {
            error!(drawdown = %snapshot.current_drawdown, "critical drawdown, pausing trading");
            if !bot.pause(DRAWDOWN_REASON).await? {
                let state = bot.status.state();
                warn!(
                    drawdown = %snapshot.current_drawdown,
                    %state,
                    "critical drawdown persists, trading already halted"
                );
                // A liquidation that failed on the pause edge is retried
                // while the breach holds
                if bot.config.close_on_pause
                    && state == LifecycleState::Paused
                    && !c.pairs.positions().is_empty()
                {
                    bot.liquidate(c, DRAWDOWN_REASON).await?;
                }
            }
        }
    }

    if verdict.daily_loss_exceeded {
        warn!(daily_pnl = %snapshot.daily_pnl, "daily loss above limit");
        bot.status.increment_metric(METRIC_DAILY_LOSS_WARNINGS, 1);
    }

    for position in c.pairs.positions() {
        let Some(ticker) = c.feed.ticker(&position.symbol) else {
            continue;
        };
        if let Some(stop) = c.risk.update_trailing_stop(&position, ticker.last) {
            c.pairs.set_stop_loss(&position.symbol, stop);
            debug!(symbol = %position.symbol, %stop, "trailing stop moved");
        }
    }
    Ok(())
}

pub(crate) async fn performance_tracker(
    bot: Arc<BotInner>,
    c: Components,
    token: ShutdownToken,
) -> Result<()> {
    let interval = secs(bot.config.loops.performance_interval_secs);
    let shared = bot.clone();

    // The tracker backs off by its own interval
    run_periodic(bot, token, PERFORMANCE, interval, interval, || {
        let c = c.clone();
        let bot = shared.clone();
        async move {
            let summary = c.pairs.performance_summary();
            let daily_pnl = bot
                .status
                .update_performance(summary.total_trades, summary.total_pnl);

            if summary.total_trades > 0 {
                info!(
                    trades = summary.total_trades,
                    win_rate = %format!("{:.1}%", summary.win_rate),
                    total_pnl = %summary.total_pnl,
                    daily_pnl = %daily_pnl,
                    "performance"
                );
            }

            if bot.config.persistence.save_state {
                bot.persist(&c).await?;
            }
            Ok(())
        }
    })
    .await
}

pub(crate) async fn health_check(
    bot: Arc<BotInner>,
    c: Components,
    token: ShutdownToken,
) -> Result<()> {
    let interval = secs(bot.config.loops.health_interval_secs);
    let reconnect = Arc::new(ReconnectionManager::new(
        c.feed.clone(),
        c.exchange.clone(),
        bot.config.exchange.clone(),
        bot.config.loops.call_timeout(),
    ));
    let shared = bot.clone();

    run_periodic(bot, token, HEALTH_CHECK, interval, interval, || {
        let bot = shared.clone();
        let c = c.clone();
        let reconnect = reconnect.clone();
        async move {
            let report = reconnect.check().await;
            for failure in report.failures() {
                bot.status.record_error(format!("{HEALTH_CHECK}: {failure}"));
            }

            bot.status.trim_errors();
            daily_reset(&bot, &c, Local::now().date_naive());
            Ok(())
        }
    })
    .await
}

/// Reset risk counters and the daily PnL baseline on a new calendar date
pub(crate) fn daily_reset(bot: &BotInner, c: &Components, today: chrono::NaiveDate) -> bool {
    if !bot.daily_gate.check(today) {
        return false;
    }
    info!(%today, "daily counter reset");
    c.risk.reset_daily_counters();
    bot.status.anchor_daily_baseline();
    true
}
