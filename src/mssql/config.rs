use tiberius::{AuthMethod, Config as TiberiusConfig, EncryptionLevel};

use crate::config::Config;

/// Translate a [`Config`] into the tiberius connection settings.
pub(crate) fn build_tiberius_config(config: &Config) -> TiberiusConfig {
    let opts = &config.options;
    let mut tiberius_config = TiberiusConfig::new();
    tiberius_config.host(&config.server);
    tiberius_config.port(config.port());
    tiberius_config.authentication(AuthMethod::sql_server(&config.user_name, &config.password));

    if let Some(database) = &opts.database {
        tiberius_config.database(database);
    }
    if let Some(instance) = &opts.instance_name {
        tiberius_config.instance_name(instance);
    }
    if let Some(app_name) = &opts.app_name {
        tiberius_config.application_name(app_name);
    }

    tiberius_config.encryption(if opts.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });
    if opts.trust_server_certificate {
        tiberius_config.trust_cert();
    }

    for key in opts.extra.keys() {
        tracing::debug!(option = %key, "driver option has no tiberius mapping; ignored");
    }

    tiberius_config
}
