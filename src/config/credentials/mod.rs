use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// All known credential slot names.
        pub const CREDENTIAL_NAMES: &[&str] = &[$($name),*];

        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `MAILTRACE_*` env var that is set and non-empty will overwrite the
        /// corresponding config field, allowing secrets to be injected without
        /// touching the config file (useful for containers and CI).
        pub fn apply_env_overrides(config: &mut Config) {
            apply_overrides_from(config, |key| std::env::var(key).ok());
        }

        /// Same as [`apply_env_overrides`] with an injectable lookup.
        pub(crate) fn apply_overrides_from(
            config: &mut Config,
            lookup: impl Fn(&str) -> Option<String>,
        ) {
            $(
                if let Some(val) = lookup($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "jwt-secret",   "MAILTRACE_JWT_SECRET" => server.jwt_secret;
    "api-token",    "MAILTRACE_API_TOKEN"  => client.credential;
}

/// Name of the source a credential slot currently resolves from.
pub fn credential_source(config: &Config, name: &str) -> &'static str {
    let env = CREDENTIAL_ENV_VARS
        .iter()
        .find(|(slot, _)| *slot == name)
        .map(|(_, env)| *env);
    if let Some(env) = env
        && std::env::var(env).is_ok_and(|v| !v.is_empty())
    {
        return "env";
    }
    match get_credential_value(config, name) {
        Some(v) if !v.is_empty() => "config",
        Some(_) => "[empty]",
        None => "unknown",
    }
}
