pub const SETTINGS_FILENAME: &str = "cluster.settings.json";
pub const RUN_STATS_FILENAME: &str = "run.stats.json";

pub const CLUSTER_RESULT_FILENAME: &str = "cluster.result.json";
pub const CLUSTER_RESULT_MESSAGEPACK_FILENAME: &str = "cluster.result.mpack";
pub const MIXTURE_MODEL_FILENAME: &str = "mixture.model.tsv";
