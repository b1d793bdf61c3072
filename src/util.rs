use std::any::Any;

const CONFIG_PATH: &str = "PULSEWATCH_CONFIG";

/// Config file path from the environment, used when none is passed on the command line
pub fn get_config_path() -> Option<String> {
    std::env::var(CONFIG_PATH).ok().filter(|path| !path.is_empty())
}

const SOURCE_TOKEN: &str = "PULSEWATCH_SOURCE_TOKEN";

/// Token for the remote stats source, for keeping it out of the config file
pub fn get_source_token() -> Option<String> {
    let token_from_env = std::env::var(SOURCE_TOKEN);
    token_from_env.ok().filter(|token| !token.is_empty())
}

/// Text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked without a message".to_string()
    }
}
