use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use cliunit::dialect;
use cliunit::error::TranslateError;
use cliunit::extract::parse_field;
use cliunit::handler::{
    ConfigReader, ConfigWriter, KeyReader, ReadContext, ReadOutcome, WriteContext, WriteOutcome,
};
use cliunit::model::{ModelBuilder, ModelObject};
use cliunit::path::{NodeKey, NodePath};
use cliunit::registry::{ConfigChange, ReaderRegistry, TranslationUnit, Translator};
use cliunit::render::{RenderContext, Template};
use cliunit::schedule::WriteOrderBuilder;
use cliunit::session::{CliSession, ExchangeRecord, ReplayTransport};

static VLAN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^vlan (\d+)").expect("pattern"));
static VLAN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*name (\S+)").expect("pattern"));

const VLAN_TEMPLATE: &str = "vlan {$id}\n{% if ($name) %}name {$name}\n{% endif %}";

struct DemoVlanReaders;

#[async_trait]
impl KeyReader for DemoVlanReaders {
    async fn read_keys(&self, ctx: &ReadContext) -> Result<Vec<NodeKey>, TranslateError> {
        let output = ctx.session().execute("show running-config").await?;
        cliunit::extract::parse_fields(
            &output,
            &VLAN_ID,
            |caps| caps.get(1).map(|m| m.as_str().to_string()),
            NodeKey,
        )
    }
}

#[async_trait]
impl ConfigReader for DemoVlanReaders {
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
        let Some(id) = parse_field(&output, &VLAN_ID, |c| c.get(1)?.as_str().parse::<i64>().ok())?
        else {
            return Ok(ReadOutcome::NotApplicable);
        };
        builder.set("id", id);
        builder.set_opt(
            "name",
            parse_field(&output, &VLAN_NAME, |c| {
                c.get(1).map(|m| m.as_str().to_string())
            })?,
        );
        Ok(ReadOutcome::Populated)
    }
}

struct DemoVlanWriter;

#[async_trait]
impl ConfigWriter for DemoVlanWriter {
    async fn create(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        let script = Template::parse(VLAN_TEMPLATE)?.render(&RenderContext::from_model(model));
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
                "vlan without id".to_string(),
            ));
        };
        ctx.session()
            .execute_sequence(&[format!("no vlan {id}")])
            .await?;
        Ok(WriteOutcome::Handled)
    }
}

struct DemoUnit;

impl TranslationUnit for DemoUnit {
    fn unit_name(&self) -> &str {
        "demo-vlan"
    }

    fn provide_readers(&self, registry: &mut ReaderRegistry) -> Result<(), TranslateError> {
        registry.add_key_reader(NodePath::of(["vlans", "vlan"]), Arc::new(DemoVlanReaders));
        registry.add_config_reader(
            NodePath::of(["vlans", "vlan", "config"]),
            Arc::new(DemoVlanReaders),
        );
        Ok(())
    }

    fn provide_writers(&self, registry: &mut WriteOrderBuilder) -> Result<(), TranslateError> {
        registry.add_noop(NodePath::of(["vlans"]))?;
        registry.add_writer_after(
            NodePath::of(["vlans", "vlan"]),
            Arc::new(DemoVlanWriter),
            [NodePath::of(["vlans"])],
        )
    }
}

/// Fixture standing in for a live device; a real deployment connects with
/// `SessionManager::connect(SshSettings::new(...), dialect)` instead.
fn fixture_session() -> (CliSession, cliunit::session::CommandLog) {
    let transport = ReplayTransport::new(vec![
        ExchangeRecord::new("show running-config", "vlan 12\nname up\nend\n"),
        ExchangeRecord::new("show running-config vlan 12", "vlan 12\nname up\nend\n"),
        ExchangeRecord::new("configure terminal", ""),
        ExchangeRecord::new("vlan 13", ""),
        ExchangeRecord::new("name staging", ""),
        ExchangeRecord::new("end", ""),
    ]);
    let log = transport.log();
    let dialect = Arc::new(dialect::brocade().expect("builtin dialect"));
    (CliSession::spawn(Box::new(transport), dialect), log)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let units: Vec<Arc<dyn TranslationUnit>> = vec![Arc::new(DemoUnit)];
    let translator = Translator::new(&units).context("compose translation units")?;
    println!("write order: {}", translator.write_order().report().join(" -> "));

    let (session, log) = fixture_session();

    // Read path: enumerate, then read one entry.
    let keys = translator
        .read_keys(&NodePath::of(["vlans", "vlan"]), &session)
        .await
        .context("enumerate vlans")?;
    println!("vlans on device: {keys:?}");

    let vlan12 = translator
        .read_node(
            &NodePath::of(["vlans"]).entry("vlan", "12").child("config"),
            &session,
        )
        .await
        .context("read vlan 12")?;
    match vlan12 {
        Some(model) => println!(
            "vlan 12: name={:?} id={:?}",
            model.str_field("name"),
            model.int_field("id")
        ),
        None => bail!("vlan 12 missing from device"),
    }

    // Write path: create a new VLAN through the ordered commit.
    let mut vlan13 = ModelBuilder::new();
    vlan13.set("id", 13i64).set("name", "staging");
    let report = translator
        .commit(
            vec![ConfigChange::Create {
                path: NodePath::of(["vlans"]).entry("vlan", "13"),
                data: vlan13.build(),
            }],
            &session,
        )
        .await
        .context("apply vlan 13")?;

    for applied in &report.applied {
        println!(
            "applied node={} action={:?} noop={}",
            applied.node, applied.action, applied.noop
        );
    }
    println!("commands sent: {:?}", log.commands());
    Ok(())
}
