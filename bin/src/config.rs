//! process configs

pub mod cli {
    //! Parse from either cli or env var

    /// Default ZooKeeper ensemble
    pub static DEFAULT_ZK_SERVERS: &str = "127.0.0.1:2181";
    /// Default external api
    pub static DEFAULT_EXTERNAL_API: &str = "[::]:3333";
    /// tokio worker thread name
    pub static DEFAULT_THREAD_NAME: &str = "mq-sync-worker";
    /// default delay before retrying a fetch lost to a disconnect
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
    /// default bound on startup, 0 disables it
    pub const DEFAULT_STARTUP_TIMEOUT: u64 = 60;
    /// default bound on each ZooKeeper connection attempt
    pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5;
    /// default log level. Can use this argument or MQ_SYNC_LOG env var
    pub const DEFAULT_MQ_SYNC_LOG: &str = "info";
    /// log as "json", "pretty" or "standard" (unstructured)
    pub const DEFAULT_LOG_FORMAT: &str = "standard";

    use std::{net::SocketAddr, time::Duration};

    pub use clap::Parser;
    use node_sync::{DEFAULT_BASE_DIR, DEFAULT_SCHEME, SyncConfig};
    use zk_coordination::ZkConfig;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "mq-sync", bin_name = "mq-sync", about, long_about = None)]
    /// parses from cli & environment var. mq-sync will load `.env` in the same dir as the binary as well
    pub struct Config {
        /// ZooKeeper connect string, ex. "zk1:2181,zk2:2181/chroot"
        #[clap(long, env, value_parser, default_value = DEFAULT_ZK_SERVERS)]
        pub zk_servers: String,
        /// parent path of all broker groups
        #[clap(long, env, value_parser, default_value = DEFAULT_BASE_DIR)]
        pub base_dir: String,
        /// broker group to follow
        #[clap(short, long, env, value_parser)]
        pub group: String,
        /// scheme prefixed to each broker address
        #[clap(long, env, value_parser, default_value = DEFAULT_SCHEME)]
        pub scheme: String,
        /// delay in ms before a fetch lost to a disconnect is retried
        #[clap(long, env, value_parser, default_value_t = DEFAULT_RETRY_DELAY_MS)]
        pub retry_delay_ms: u64,
        /// seconds to wait for the first sync, 0 waits forever
        #[clap(long, env, value_parser, default_value_t = DEFAULT_STARTUP_TIMEOUT)]
        pub startup_timeout: u64,
        /// seconds allowed for each ZooKeeper connection attempt
        #[clap(long, env, value_parser, default_value_t = DEFAULT_CONNECT_TIMEOUT)]
        pub connect_timeout: u64,
        /// retries after a failed initial connection attempt
        #[clap(long, env, value_parser, default_value_t = 0)]
        pub connect_retry_max: u32,
        /// the address for the health & metrics api
        #[clap(long, env, value_parser, default_value = DEFAULT_EXTERNAL_API)]
        pub external_api: SocketAddr,
        /// Worker thread name
        #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
        pub thread_name: String,
        /// number of worker threads, defaults to the number of logical CPUs
        #[clap(long, env, value_parser)]
        pub threads: Option<usize>,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env, value_parser, default_value = DEFAULT_MQ_SYNC_LOG)]
        pub mq_sync_log: String,
        /// log output format: "standard", "json" or "pretty"
        #[clap(long, env, value_parser, default_value = DEFAULT_LOG_FORMAT)]
        pub log_format: String,
    }

    impl Config {
        /// settings for the endpoint sync
        pub fn sync_config(&self) -> SyncConfig {
            SyncConfig {
                base_dir: self.base_dir.clone(),
                group: self.group.clone(),
                scheme: self.scheme.clone(),
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                startup_timeout: (self.startup_timeout > 0)
                    .then(|| Duration::from_secs(self.startup_timeout)),
            }
        }

        /// settings for the ZooKeeper session
        pub fn zk_config(&self) -> ZkConfig {
            ZkConfig {
                servers: self.zk_servers.clone(),
                connect_timeout: Duration::from_secs(self.connect_timeout),
                connect_retry_max: self.connect_retry_max,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = Config::try_parse_from(["mq-sync", "--group", "orders"]).unwrap();
            let sync = config.sync_config();
            assert_eq!(sync.base_dir, "/mqs");
            assert_eq!(sync.group, "orders");
            assert_eq!(sync.scheme, "tcp://");
            assert_eq!(sync.retry_delay, Duration::from_millis(100));
            assert_eq!(sync.startup_timeout, Some(Duration::from_secs(60)));
            assert_eq!(sync.group_path().unwrap().as_str(), "/mqs/orders");

            let zk = config.zk_config();
            assert_eq!(zk.servers, "127.0.0.1:2181");
            assert_eq!(zk.connect_timeout, Duration::from_secs(5));
            assert_eq!(zk.connect_retry_max, 0);
        }

        #[test]
        fn test_zero_startup_timeout_waits_forever() {
            let config = Config::try_parse_from([
                "mq-sync",
                "--group",
                "orders",
                "--startup-timeout",
                "0",
                "--scheme",
                "ssl://",
            ])
            .unwrap();
            let sync = config.sync_config();
            assert_eq!(sync.startup_timeout, None);
            assert_eq!(sync.scheme, "ssl://");
        }
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    /// Configuration for `tracing` output
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: String,
    }

    impl Config {
        /// Install the global subscriber
        pub fn parse(mq_sync_log: &str, log_frmt: &str) -> Result<Self> {
            // Log level comes from MQ_SYNC_LOG
            let filter = EnvFilter::try_new(mq_sync_log)
                .or_else(|_| EnvFilter::try_new("info"))?
                .add_directive("hyper=off".parse()?)
                .add_directive("zookeeper_client=warn".parse()?);

            match log_frmt {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self {
                log_frmt: log_frmt.to_owned(),
            })
        }
    }
}
