mod runtime;
mod settings;

pub use runtime::{
    ModulePathPlan, RuntimeConfig, CLASSPATH_VAR, HTTPS_PROXY_VAR, JAVA_HOME_VAR,
    OVERRIDE_ROOT_VAR, RAPIDWRIGHT_VERSION, SEARCH_PATH_VAR,
};
pub use settings::{BootstrapSettings, HardeningPolicy, SETTINGS_VAR};
