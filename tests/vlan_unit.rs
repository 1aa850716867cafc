//! End-to-end tests for a VLAN/interface translation unit running against an
//! offline replay transport.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use cliunit::dialect;
use cliunit::error::TranslateError;
use cliunit::extract::{parse_field, parse_fields, parse_non_distinct_fields, zip_columns};
use cliunit::handler::{
    ConfigReader, ConfigWriter, KeyReader, ReadContext, ReadOutcome, WriteContext, WriteOutcome,
};
use cliunit::model::{ModelBuilder, ModelObject};
use cliunit::path::{NodeKey, NodePath};
use cliunit::registry::{ConfigChange, ReaderRegistry, TranslationUnit, Translator};
use cliunit::render::{RenderContext, Template};
use cliunit::schedule::WriteOrderBuilder;
use cliunit::session::{CliSession, CommandLog, ExchangeRecord, ReplayTransport};

static VLAN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^vlan (\d+)").expect("pattern"));
static VLAN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*name (\S+)").expect("pattern"));
static VLAN_SHUTDOWN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*shutdown\s*$").expect("pattern"));

const VLAN_WRITE_TEMPLATE: &str = "vlan {$id}\n{% if ($name) %}name {$name}\n{% endif %}{% if ($enabled == false) %}shutdown\n{% endif %}";

const TRUNK_WRITE_TEMPLATE: &str = "configure terminal\n{% loop in $trunk-vlans as $vlan %}vlan {$vlan}\ntagged {$port}\nend\n{% divider %}{% onEmpty %}{% endloop %}{% if ($native-vlan) %}vlan {$native-vlan}\nuntagged {$port}\nend\n{% endif %}";

fn vlan_list_path() -> NodePath {
    NodePath::of(["vlans", "vlan"])
}

fn vlan_config_path(id: &str) -> NodePath {
    NodePath::of(["vlans"]).entry("vlan", id).child("config")
}

struct VlanKeyReader;

#[async_trait]
impl KeyReader for VlanKeyReader {
    async fn read_keys(&self, ctx: &ReadContext) -> Result<Vec<NodeKey>, TranslateError> {
        // One full running-config scrape is shared by all sibling reads of
        // the transaction.
        let ids = ctx
            .cache()
            .get_or_compute("vlan-ids", || async {
                let output = ctx.session().execute("show running-config").await?;
                parse_fields(
                    &output,
                    &VLAN_ID,
                    |caps| caps.get(1).map(|m| m.as_str().to_string()),
                    NodeKey,
                )
            })
            .await?;
        Ok(ids.as_ref().clone())
    }
}

struct VlanConfigReader;

#[async_trait]
impl ConfigReader for VlanConfigReader {
    async fn read_into(
        &self,
        key: Option<&NodeKey>,
        builder: &mut ModelBuilder,
        ctx: &ReadContext,
    ) -> Result<ReadOutcome, TranslateError> {
        let Some(key) = key else {
            return Ok(ReadOutcome::NotApplicable);
        };
        let output = ctx
            .session()
            .execute(&format!("show running-config vlan {key}"))
            .await?;

        let id = parse_field(&output, &VLAN_ID, |caps| {
            caps.get(1)?.as_str().parse::<i64>().ok()
        })?;
        let Some(id) = id else {
            return Ok(ReadOutcome::NotApplicable);
        };

        builder.set("id", id);
        builder.set_opt(
            "name",
            parse_field(&output, &VLAN_NAME, |caps| {
                caps.get(1).map(|m| m.as_str().to_string())
            })?,
        );
        let suspended = parse_field(&output, &VLAN_SHUTDOWN, |_| Some(()))?.is_some();
        builder.set("status", if suspended { "SUSPENDED" } else { "ACTIVE" });
        Ok(ReadOutcome::Populated)
    }
}

struct VlanWriter;

#[async_trait]
impl ConfigWriter for VlanWriter {
    async fn create(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        if !model.has_field("id") {
            return Err(TranslateError::UnsupportedCombination(
                "vlan config without id".to_string(),
            ));
        }
        let script = Template::parse(VLAN_WRITE_TEMPLATE)?.render(&RenderContext::from_model(model));
        let commands: Vec<String> = script.lines().map(str::to_string).collect();
        ctx.session().execute_sequence(&commands).await?;
        Ok(WriteOutcome::Handled)
    }

    async fn delete(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        let Some(id) = model.int_field("id") else {
            return Err(TranslateError::UnsupportedCombination(
                "vlan config without id".to_string(),
            ));
        };
        ctx.session()
            .execute_sequence(&[format!("no vlan {id}")])
            .await?;
        Ok(WriteOutcome::Handled)
    }
}

/// Writes trunk/native VLAN membership of one port. Runs after the VLAN
/// writer: a VLAN must exist before a port can be tagged into it.
struct PortVlanWriter;

#[async_trait]
impl ConfigWriter for PortVlanWriter {
    async fn create(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        if !model.has_field("port") {
            return Ok(WriteOutcome::NotHandled);
        }
        let script =
            Template::parse(TRUNK_WRITE_TEMPLATE)?.render(&RenderContext::from_model(model));
        // The template carries its own mode wrappers, line for line.
        for command in script.lines() {
            ctx.session().execute(command).await?;
        }
        Ok(WriteOutcome::Handled)
    }

    async fn delete(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        let Some(port) = model.str_field("port") else {
            return Ok(WriteOutcome::NotHandled);
        };
        let mut commands = Vec::new();
        if let Some(trunks) = model.list_field("trunk-vlans") {
            for vlan in trunks.iter().filter_map(|v| v.as_int()) {
                commands.push(format!("vlan {vlan}"));
                commands.push(format!("no tagged {port}"));
                commands.push("end".to_string());
            }
        }
        ctx.session().execute_sequence(&commands).await?;
        Ok(WriteOutcome::Handled)
    }
}

struct VlanUnit;

impl TranslationUnit for VlanUnit {
    fn unit_name(&self) -> &str {
        "brocade-vlan"
    }

    fn provide_readers(&self, registry: &mut ReaderRegistry) -> Result<(), TranslateError> {
        registry.add_key_reader(vlan_list_path(), Arc::new(VlanKeyReader));
        registry.add_config_reader(
            NodePath::of(["vlans", "vlan", "config"]),
            Arc::new(VlanConfigReader),
        );
        Ok(())
    }

    fn provide_writers(&self, registry: &mut WriteOrderBuilder) -> Result<(), TranslateError> {
        registry.add_noop(NodePath::of(["vlans"]))?;
        registry.add_writer_after(vlan_list_path(), Arc::new(VlanWriter), [NodePath::of([
            "vlans",
        ])])?;
        registry.add_writer_after(
            NodePath::of(["interfaces", "interface", "switched-vlan"]),
            Arc::new(PortVlanWriter),
            [vlan_list_path()],
        )?;
        Ok(())
    }
}

fn replay_session(records: Vec<ExchangeRecord>) -> (CliSession, CommandLog) {
    let transport = ReplayTransport::new(records);
    let log = transport.log();
    let dialect = Arc::new(dialect::brocade().expect("dialect"));
    (CliSession::spawn(Box::new(transport), dialect), log)
}

fn translator() -> Translator {
    let units: Vec<Arc<dyn TranslationUnit>> = vec![Arc::new(VlanUnit)];
    Translator::new(&units).expect("translator")
}

#[tokio::test]
async fn vlan_without_shutdown_line_reads_as_active() {
    let translator = translator();
    let (session, _) = replay_session(vec![ExchangeRecord::new(
        "show running-config vlan 12",
        "vlan 12\nname up\nend\n",
    )]);

    let model = translator
        .read_node(&vlan_config_path("12"), &session)
        .await
        .expect("read")
        .expect("populated");

    assert_eq!(model.int_field("id"), Some(12));
    assert_eq!(model.str_field("name"), Some("up"));
    assert_eq!(model.str_field("status"), Some("ACTIVE"));
}

#[tokio::test]
async fn vlan_with_shutdown_line_reads_as_suspended() {
    let translator = translator();
    let (session, _) = replay_session(vec![ExchangeRecord::new(
        "show running-config vlan 12",
        "vlan 12\nname up\n shutdown\nend\n",
    )]);

    let model = translator
        .read_node(&vlan_config_path("12"), &session)
        .await
        .expect("read")
        .expect("populated");

    assert_eq!(model.str_field("status"), Some("SUSPENDED"));
}

#[tokio::test]
async fn absent_vlan_reads_as_not_applicable() {
    let translator = translator();
    let (session, _) = replay_session(vec![ExchangeRecord::new(
        "show running-config vlan 99",
        "\n",
    )]);

    let model = translator
        .read_node(&vlan_config_path("99"), &session)
        .await
        .expect("read");
    assert!(model.is_none());
}

#[test]
fn trunk_write_script_is_byte_exact() {
    let mut model = ModelBuilder::new();
    model
        .set("port", "ethernet 1/3")
        .set("trunk-vlans", vec![13i64, 14, 15])
        .set("native-vlan", 2i64);

    let script = Template::parse(TRUNK_WRITE_TEMPLATE)
        .expect("template")
        .render(&RenderContext::from_model(&model.build()));

    assert_eq!(
        script,
        "configure terminal\n\
         vlan 13\ntagged ethernet 1/3\nend\n\
         vlan 14\ntagged ethernet 1/3\nend\n\
         vlan 15\ntagged ethernet 1/3\nend\n\
         vlan 2\nuntagged ethernet 1/3\nend\n"
    );
}

#[test]
fn trunk_write_script_omits_absent_native_vlan() {
    let mut model = ModelBuilder::new();
    model
        .set("port", "ethernet 1/3")
        .set("trunk-vlans", vec![13i64]);

    let script = Template::parse(TRUNK_WRITE_TEMPLATE)
        .expect("template")
        .render(&RenderContext::from_model(&model.build()));

    assert_eq!(script, "configure terminal\nvlan 13\ntagged ethernet 1/3\nend\n");
}

#[tokio::test]
async fn commit_orders_vlan_before_port_membership() {
    let translator = translator();
    let (session, log) = replay_session(vec![
        ExchangeRecord::new("configure terminal", ""),
        ExchangeRecord::new("vlan 13", ""),
        ExchangeRecord::new("end", ""),
        ExchangeRecord::new("configure terminal", ""),
        ExchangeRecord::new("vlan 13", ""),
        ExchangeRecord::new("tagged ethernet 1/3", ""),
        ExchangeRecord::new("end", ""),
    ]);

    let mut membership = ModelBuilder::new();
    membership
        .set("port", "ethernet 1/3")
        .set("trunk-vlans", vec![13i64]);
    let mut vlan = ModelBuilder::new();
    vlan.set("id", 13i64);

    // Submitted in the wrong order on purpose; the resolved order fixes it.
    let changes = vec![
        ConfigChange::Create {
            path: NodePath::of(["interfaces"])
                .entry("interface", "ethernet 1/3")
                .child("switched-vlan"),
            data: membership.build(),
        },
        ConfigChange::Create {
            path: NodePath::of(["vlans"]).entry("vlan", "13"),
            data: vlan.build(),
        },
    ];

    let report = translator.commit(changes, &session).await.expect("commit");
    assert_eq!(report.applied.len(), 2);

    let sent = log.commands();
    let vlan_pos = sent.iter().position(|c| c == "vlan 13").expect("vlan sent");
    let tagged_pos = sent
        .iter()
        .position(|c| c == "tagged ethernet 1/3")
        .expect("tagged sent");
    assert!(vlan_pos < tagged_pos);
}

#[tokio::test]
async fn rejected_command_fails_commit_and_stops_the_sequence() {
    let translator = translator();
    let (session, log) = replay_session(vec![
        ExchangeRecord::new("configure terminal", ""),
        ExchangeRecord::new("vlan 4095", "Invalid input -> vlan 4095\n"),
        ExchangeRecord::new("name up", ""),
        ExchangeRecord::new("end", ""),
    ]);

    let mut vlan = ModelBuilder::new();
    vlan.set("id", 4095i64).set("name", "up");
    let changes = vec![ConfigChange::Create {
        path: NodePath::of(["vlans"]).entry("vlan", "4095"),
        data: vlan.build(),
    }];

    let err = match translator.commit(changes, &session).await {
        Ok(_) => panic!("rejected command must fail the commit"),
        Err(err) => err,
    };
    assert!(matches!(err, TranslateError::WriteFailed { .. }));
    assert!(err.to_string().contains("could not apply configuration"));

    // Fail-fast: nothing after the rejected command went out.
    let sent = log.commands();
    assert!(!sent.iter().any(|c| c == "name up"));
    assert!(!sent.iter().any(|c| c == "end"));
}

#[tokio::test]
async fn enumeration_scrape_runs_once_per_transaction() {
    let translator = translator();
    let running_config = "vlan 12\nname up\nend\nvlan 13\nname down\nend\n";
    let (session, log) = replay_session(vec![ExchangeRecord::new(
        "show running-config",
        running_config,
    )]);

    let tx = translator.begin_read(&session);
    let first = tx.read_keys(&vlan_list_path()).await.expect("first read");
    let second = tx.read_keys(&vlan_list_path()).await.expect("second read");
    assert_eq!(first, second);
    assert_eq!(log.count_of("show running-config"), 1);

    // A new transaction must scrape again.
    translator
        .read_keys(&vlan_list_path(), &session)
        .await
        .expect("new transaction read");
    assert_eq!(log.count_of("show running-config"), 2);
}

#[tokio::test]
async fn write_then_read_recovers_explicitly_set_fields() {
    let translator = translator();

    let mut vlan = ModelBuilder::new();
    vlan.set("id", 12i64).set("name", "up");
    let written = vlan.build();

    // Render the write script, then shape the device's running config the
    // way those commands would leave it.
    let script =
        Template::parse(VLAN_WRITE_TEMPLATE).expect("template").render(&RenderContext::from_model(&written));
    assert_eq!(script, "vlan 12\nname up\n");
    let device_view = format!("{script}end\n");

    let (session, _) = replay_session(vec![
        ExchangeRecord::new("configure terminal", ""),
        ExchangeRecord::new("vlan 12", ""),
        ExchangeRecord::new("name up", ""),
        ExchangeRecord::new("end", ""),
        ExchangeRecord::new("show running-config vlan 12", device_view),
    ]);

    translator
        .commit(
            vec![ConfigChange::Create {
                path: NodePath::of(["vlans"]).entry("vlan", "12"),
                data: written.clone(),
            }],
            &session,
        )
        .await
        .expect("commit");

    let read_back = translator
        .read_node(&vlan_config_path("12"), &session)
        .await
        .expect("read")
        .expect("populated");

    for (field, value) in written.fields() {
        assert_eq!(read_back.field(field), Some(value), "field {field}");
    }
    // Fields the writer never set stay absent on the wire; the reader derives
    // status from the absence of a shutdown line.
    assert_eq!(read_back.str_field("status"), Some("ACTIVE"));
}

#[tokio::test]
async fn conflicting_unit_edges_fail_translator_construction() {
    struct CycleUnit;

    impl TranslationUnit for CycleUnit {
        fn unit_name(&self) -> &str {
            "cycle"
        }

        fn provide_readers(&self, _registry: &mut ReaderRegistry) -> Result<(), TranslateError> {
            Ok(())
        }

        fn provide_writers(&self, registry: &mut WriteOrderBuilder) -> Result<(), TranslateError> {
            // vlans/vlan must follow switched-vlan, the reverse of VlanUnit.
            registry.add_writer_after(
                NodePath::of(["extra"]),
                Arc::new(VlanWriter),
                [NodePath::of(["interfaces", "interface", "switched-vlan"])],
            )?;
            registry.add_writer_after(
                NodePath::of(["vlans", "vlan"]),
                Arc::new(VlanWriter),
                [NodePath::of(["extra"])],
            )
        }
    }

    let units: Vec<Arc<dyn TranslationUnit>> = vec![Arc::new(VlanUnit), Arc::new(CycleUnit)];
    let err = match Translator::new(&units) {
        Ok(_) => panic!("cycle across units should fail construction"),
        Err(err) => err,
    };
    assert!(matches!(err, TranslateError::OrderingCycle(_)));
}

#[test]
fn modem_table_columns_zip_back_into_rows() {
    let output = "\
cable1/0/0   yes   online     1.1   act   2     0011.2233.4455   10.0.0.2
cable1/0/1   no    offline    -     -     0     -                -
cable1/0/2   yes   online     1.0   act   1     6677.8899.aabb   10.0.0.4
";

    let column_patterns = [
        r"^(\S+)\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s*$",
        r"^\S+\s+(\S+)\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s*$",
        r"^\S+\s+\S+\s+(\S+)\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s*$",
        r"^\S+\s+\S+\s+\S+\s+(\S+)\s+\S+\s+\S+\s+\S+\s+\S+\s*$",
        r"^\S+\s+\S+\s+\S+\s+\S+\s+(\S+)\s+\S+\s+\S+\s+\S+\s*$",
        r"^\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+(\S+)\s+\S+\s+\S+\s*$",
        r"^\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+(\S+)\s+\S+\s*$",
        r"^\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+(\S+)\s*$",
    ];

    let columns: Vec<Vec<String>> = column_patterns
        .iter()
        .map(|pattern| {
            let pattern = Regex::new(pattern).expect("pattern");
            parse_non_distinct_fields(
                output,
                &pattern,
                |caps| caps.get(1).map(|m| m.as_str().to_string()),
                |v| v,
            )
            .expect("column")
        })
        .collect();

    let rows = zip_columns(&columns).expect("zip");
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0],
        vec!["cable1/0/0", "yes", "online", "1.1", "act", "2", "0011.2233.4455", "10.0.0.2"]
    );
    assert_eq!(
        rows[1],
        vec!["cable1/0/1", "no", "offline", "-", "-", "0", "-", "-"]
    );
    assert_eq!(rows[2][6], "6677.8899.aabb");
}
