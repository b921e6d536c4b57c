//! Built-in node attributes. Node files are deep-merged over these.

use serde_json::{json, Value};

use super::attributes::AttributeTree;

pub fn default_attributes() -> AttributeTree {
    AttributeTree::from_value(json!({
        "hbase": {
            "version": "2.4.0",
            "mirror": "https://downloads.apache.org/hbase",
            "checksum": null,
            "install_dir": "/opt/hbase",
            "conf_dir": "/etc/hbase/conf",
            "log_dir": "/var/log/hbase",
            "pid_dir": "/var/run/hbase",
            "user": "hbase",
            "group": "hbase",
            "uid": 2313,
            "gid": 2313,
            "log_level": "INFO",
            "restart_on_config_change": true,

            "java": { "version": "11" },
            "java_home": null,
            "java_opts": "-Xmx1024m -XX:+UseG1GC -XX:+ParallelRefProcEnabled -XX:MaxGCPauseMillis=200",

            "limits": { "nofile": 32768, "nproc": 65536 },

            "install": { "method": "binary", "packages": [] },

            "topology": {
                "role": null,
                "quorum_members": [],
                "masters": [],
                "regionservers": [],
                "backup_masters": []
            },

            "config": default_site_config(),

            "security": {
                "authentication": "simple",
                "authorization": false,
                "superuser": "hbase",
                "kerberos": {
                    "principal": "hbase/_HOST",
                    "keytab": "/etc/hbase/conf/hbase.keytab",
                    "realm": "EXAMPLE.COM",
                    "server_principal": "hbase/_HOST@EXAMPLE.COM",
                    "regionserver_principal": "hbase/_HOST@EXAMPLE.COM"
                }
            },

            "hadoop": { "version": "3.3.5", "hdfs_site": {}, "core_site": {} },

            "services": {
                "thrift": { "enabled": false, "config": {} },
                "rest": { "enabled": false, "config": {} }
            },

            "metrics": {
                "enabled": false,
                "provider": "prometheus",
                "prometheus": {
                    "port": 9090,
                    "agent_url": "https://repo1.maven.org/maven2/io/prometheus/jmx/jmx_prometheus_javaagent/0.20.0/jmx_prometheus_javaagent-0.20.0.jar",
                    "agent_checksum": null
                },
                "graphite": { "host": "localhost", "port": 2003, "prefix": "hbase" },
                "period": 10
            },

            "coprocessors": [],

            "service_mapping": {
                "master": { "service_name": "master", "start_priority": 10, "conf_file": "hbase-site.xml" },
                "regionserver": { "service_name": "regionserver", "start_priority": 20, "conf_file": "hbase-site.xml" },
                "thrift": { "service_name": "thrift", "start_priority": 30, "conf_file": "hbase-site.xml" },
                "rest": { "service_name": "rest", "start_priority": 40, "conf_file": "hbase-site.xml" }
            }
        },
        "platform": { "family": "debian", "fqdn": "localhost" }
    }))
}

fn default_site_config() -> Value {
    json!({
        "hbase.rootdir": "file:///var/hbase",
        "hbase.zookeeper.quorum": "localhost",
        "hbase.zookeeper.property.dataDir": "/var/lib/zookeeper",
        "hbase.cluster.distributed": false,
        "hbase.zookeeper.property.clientPort": 2181,

        "hbase.master.port": 16000,
        "hbase.master.info.port": 16010,
        "hbase.regionserver.port": 16020,
        "hbase.regionserver.info.port": 16030,
        "hbase.rest.port": 8080,
        "hbase.rest.info.port": 8085,
        "hbase.thrift.port": 9090,
        "hbase.thrift.info.port": 9095,
        "hbase.regionserver.handler.count": 30,
        "hbase.hregion.memstore.flush.size": 134_217_728u64,
        "hbase.hregion.max.filesize": 10_737_418_240u64,
        "hbase.hstore.blockingStoreFiles": 10,
        "hbase.hstore.compactionThreshold": 3,
        "hbase.hstore.compaction.max": 10,
        "hbase.client.scanner.caching": 100,
        "hbase.client.scanner.timeout.period": 60000,
        "hbase.client.retries.number": 35,
        "hbase.client.pause": 100,
        "hbase.client.max.perserver.tasks": 2,
        "hbase.defaults.for.version.skip": true,

        "hbase.ipc.server.read.threadpool.size": 10,
        "hbase.server.thread.wakefrequency": 10000,
        "hbase.server.versionfile.writeattempts": 3,
        "hbase.rpc.timeout": 60000,
        "hbase.regions.slop": 0.2
    })
}
