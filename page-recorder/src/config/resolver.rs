//! Resolution of a [`SessionConfig`] from the environment.

use tracing::debug;

use super::overrides::{ConfigOverride, SourceOverride, TemplateOverride};
use super::{
    API_KEY_ENV, API_SECRET_ENV, CONFIG_ENV, Environment, NOTHING_TO_RECORD, ROOM_NAME_ENV,
    SessionConfig, TEMPLATE_BASE_ENV, TEMPLATE_ENV, URL_ENV, WS_URL_ENV,
};
use crate::{Error, Result};

/// Resolve the session configuration.
///
/// The structured override in [`CONFIG_ENV`] takes precedence. Without it a
/// bare [`URL_ENV`], then a complete room + credentials set, is turned into
/// the source. Anything else is a configuration error and nothing is started.
pub fn resolve(env: &dyn Environment) -> Result<SessionConfig> {
    let overrides = match env.var(CONFIG_ENV) {
        Some(raw) => {
            debug!("Resolving configuration from {}", CONFIG_ENV);
            ConfigOverride::from_json(&raw)?
        }
        None => from_simple_vars(env)?,
    };

    overrides.into_config(env)
}

fn from_simple_vars(env: &dyn Environment) -> Result<ConfigOverride> {
    let source = if let Some(url) = env.var(URL_ENV) {
        debug!("Resolving source from {}", URL_ENV);
        SourceOverride {
            url: Some(url),
            template: None,
        }
    } else if let (Some(ws_url), Some(api_key), Some(api_secret), Some(room_name)) = (
        env.var(WS_URL_ENV),
        env.var(API_KEY_ENV),
        env.var(API_SECRET_ENV),
        env.var(ROOM_NAME_ENV),
    ) {
        debug!(room = %room_name, "Resolving templated room from environment");
        SourceOverride {
            url: None,
            template: Some(TemplateOverride {
                kind: env.var(TEMPLATE_ENV),
                ws_url: Some(ws_url),
                base: env.var(TEMPLATE_BASE_ENV),
                token: None,
                api_key: Some(api_key),
                api_secret: Some(api_secret),
                room_name: Some(room_name),
            }),
        }
    } else {
        return Err(Error::config(NOTHING_TO_RECORD));
    };

    Ok(ConfigOverride {
        source,
        ..Default::default()
    })
}
