// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use soupbin_fix_client_rs::{
    cfg::{cli::resolve_config_path, config::Config, enums::SessionKind, logger::init_logger},
    fix::{FixClientSession, FixMessageRegistry, Message, catalog as fix_catalog, field::FixValue},
    session::SessionOptions,
    soup::SoupClientSession,
};
use tokio::time::timeout;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path("config/session.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let addr = format!("{}:{}", cfg.identity.host, cfg.identity.port)
        .parse()
        .context("host/port did not form a valid socket address")?;

    let session_options = SessionOptions {
        graceful_shutdown: cfg.runtime.graceful_shutdown,
        drain_policy: cfg.runtime.drain_policy,
        max_frame_length: cfg.limits.max_frame_length as usize,
    };

    match cfg.session {
        SessionKind::SoupBinTcp => {
            let soup_identity = cfg.identity.soup.context("SoupBinTCP identity missing after validation")?;
            let session = SoupClientSession::connect(
                addr,
                cfg.timers.heartbeat_interval,
                cfg.timers.heartbeat_interval,
                session_options,
                Arc::new(|| info!("soup session closed")),
            )
            .await
            .context("connect failed")?;

            timeout(
                cfg.timers.connect_timeout,
                session.login(&soup_identity.user, &soup_identity.password, &soup_identity.session, &soup_identity.sequence),
            )
            .await
            .context("login timed out")??;

            info!("logged in to SoupBinTCP session {:?}", session.session_id_sync());
            session.logout().await?;
        },
        SessionKind::Fix => {
            let fix_identity = cfg.identity.fix.context("FIX identity missing after validation")?;
            let registry = Arc::new(FixMessageRegistry::new());
            fix_catalog::register_into(&registry, "fix")?;

            let begin_string: &'static str = Box::leak(fix_identity.begin_string.clone().into_boxed_str());
            let session = FixClientSession::connect(
                addr,
                begin_string,
                "fix",
                registry,
                session_options,
                Arc::new(|| info!("fix session closed")),
            )
            .await
            .context("connect failed")?;

            let mut logon = Message::new(fix_catalog::LOGON_DEF.clone());
            logon.header.set_field("SenderCompID", FixValue::Str(fix_identity.sender_comp_id))?;
            logon.header.set_field("TargetCompID", FixValue::Str(fix_identity.target_comp_id))?;
            logon.header.set_field("MsgSeqNum", FixValue::Int(1))?;
            logon.header.set_field("SendingTime", FixValue::Str(String::new()))?;
            logon.body.set_field("EncryptMethod", FixValue::Int(0))?;
            logon
                .body
                .set_field("HeartBtInt", FixValue::Int(cfg.timers.heartbeat_interval.as_secs() as i64))?;

            timeout(cfg.timers.connect_timeout, session.login(logon)).await.context("login timed out")??;
            info!("logged in to FIX session");
            session.logout(None).await?;
        },
    }

    Ok(())
}
