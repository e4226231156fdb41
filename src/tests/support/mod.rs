// Shared test support code for integration tests.

pub mod server;

use std::path::Path;
use std::sync::Once;

use crate::config::{new_test_config, Config};

pub use server::{FakeServer, Hit, RunState, AUTH_COOKIE, DIID};

static LOGGER: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    });
}

/// Test configuration for `server`, with every scratch file under `dir`.
pub fn config_for(server: &FakeServer, dir: &Path, node_instance: &str) -> Config {
    let mut cfg = new_test_config(server.endpoint(), dir);
    cfg.agent.run.node_instance = node_instance.to_string();
    cfg
}

/// Machine run: no targets, a single image.
pub const MACHINE_RUN: &str = r#"<run category="Image" type="Machine" mutable="false" cloudServiceName="exoscale" nodeNames="machine">
  <module category="Image" name="examples/ubuntu">
    <targets><target name="execute"></target></targets>
  </module>
</run>"#;

/// Deployment where the `apache` node writes a marker from its execute target
/// and a log file from its report target.
pub const DEPLOYMENT_RUN: &str = r#"<run category="Deployment" type="Orchestration" mutable="false"
     cloudServiceName="exoscale" nodeNames="orchestrator-exoscale, apache.1">
  <module category="Deployment" name="examples/lamp">
    <nodes>
      <entry>
        <node name="apache">
          <image name="ubuntu">
            <targets>
              <target name="execute">#!/bin/sh
echo "$RUN_ID $NODE_INSTANCE_NAME" > executed.txt</target>
              <target name="report">#!/bin/sh
mkdir -p logs &amp;&amp; echo done > logs/apache.log</target>
            </targets>
          </image>
        </node>
      </entry>
    </nodes>
  </module>
  <runtimeParameters>
    <entry><runtimeParameter key="apache.1:cloudservice" group="apache.1">exoscale</runtimeParameter></entry>
    <entry><runtimeParameter key="orchestrator-exoscale:cloudservice" group="orchestrator-exoscale">exoscale</runtimeParameter></entry>
  </runtimeParameters>
</run>"#;

/// Deployment whose execute target fails.
pub const FAILING_RUN: &str = r#"<run category="Deployment" type="Run" mutable="false"
     cloudServiceName="exoscale" nodeNames="apache.1">
  <module category="Deployment" name="examples/broken">
    <nodes>
      <entry>
        <node name="apache">
          <image name="ubuntu">
            <targets>
              <target name="execute">#!/bin/sh
echo broken >&amp;2; exit 3</target>
            </targets>
          </image>
        </node>
      </entry>
    </nodes>
  </module>
  <runtimeParameters>
    <entry><runtimeParameter key="apache.1:cloudservice" group="apache.1">exoscale</runtimeParameter></entry>
  </runtimeParameters>
</run>"#;

/// Deployment seen by the orchestrator: `apache.1` waits to be created,
/// `apache.2` waits to be removed.
pub const SCALING_RUN: &str = r#"<run category="Deployment" type="Orchestration" mutable="true"
     cloudServiceName="exoscale" nodeNames="orchestrator-exoscale, apache.1, apache.2">
  <module category="Deployment" name="examples/lamp">
    <nodes>
      <entry>
        <node name="apache">
          <image name="ubuntu">
            <targets><target name="execute">#!/bin/sh
true</target></targets>
          </image>
        </node>
      </entry>
    </nodes>
  </module>
  <runtimeParameters>
    <entry><runtimeParameter key="apache.1:cloudservice" group="apache.1">exoscale</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.1:scale.state" group="apache.1">creating</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.2:cloudservice" group="apache.2">exoscale</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.2:scale.state" group="apache.2">removing</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.2:instanceid" group="apache.2">vm-2</runtimeParameter></entry>
    <entry><runtimeParameter key="orchestrator-exoscale:cloudservice" group="orchestrator-exoscale">exoscale</runtimeParameter></entry>
  </runtimeParameters>
</run>"#;

/// Image run seen by its orchestrator: the `machine` creator waits to be
/// started and snapshotted.
pub const IMAGE_RUN: &str = r#"<run category="Image" type="Machine" mutable="false"
     cloudServiceName="exoscale" nodeNames="orchestrator-exoscale, machine">
  <module category="Image" name="examples/nginx" resourceUri="module/examples/nginx/12">
    <prerecipe>#!/bin/sh
apt-get update</prerecipe>
    <recipe>#!/bin/sh
echo built</recipe>
    <packages><package name="nginx"/></packages>
  </module>
  <runtimeParameters>
    <entry><runtimeParameter key="machine:cloudservice" group="machine">exoscale</runtimeParameter></entry>
    <entry><runtimeParameter key="machine:scale.state" group="machine">creating</runtimeParameter></entry>
    <entry><runtimeParameter key="orchestrator-exoscale:cloudservice" group="orchestrator-exoscale">exoscale</runtimeParameter></entry>
  </runtimeParameters>
</run>"#;

/// Mutable deployment where `apache.1` is operational and `apache.2` is
/// being added; the scale targets record their environment.
pub const SCALE_UP_RUN: &str = r#"<run category="Deployment" type="Orchestration" mutable="true"
     cloudServiceName="exoscale" nodeNames="apache.1, apache.2">
  <module category="Deployment" name="examples/lamp">
    <nodes>
      <entry>
        <node name="apache">
          <image name="ubuntu">
            <targets>
              <target name="execute">#!/bin/sh
touch executed.txt</target>
              <target name="onvmadd">#!/bin/sh
echo "$SCALING_NODE_NAME $SCALING_NODE_INSTANCES" > scaled.txt</target>
            </targets>
          </image>
        </node>
      </entry>
    </nodes>
  </module>
  <runtimeParameters>
    <entry><runtimeParameter key="apache.1:cloudservice" group="apache.1">exoscale</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.1:scale.state" group="apache.1">operational</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.2:cloudservice" group="apache.2">exoscale</runtimeParameter></entry>
    <entry><runtimeParameter key="apache.2:scale.state" group="apache.2">creating</runtimeParameter></entry>
  </runtimeParameters>
</run>"#;

/// Deployment whose report target writes a log and then fails.
pub const FAILING_REPORT_RUN: &str = r#"<run category="Deployment" type="Run" mutable="false"
     cloudServiceName="exoscale" nodeNames="apache.1">
  <module category="Deployment" name="examples/noisy">
    <nodes>
      <entry>
        <node name="apache">
          <image name="ubuntu">
            <targets>
              <target name="execute">#!/bin/sh
true</target>
              <target name="report">#!/bin/sh
mkdir -p logs &amp;&amp; echo partial > logs/apache.log; exit 4</target>
            </targets>
          </image>
        </node>
      </entry>
    </nodes>
  </module>
  <runtimeParameters>
    <entry><runtimeParameter key="apache.1:cloudservice" group="apache.1">exoscale</runtimeParameter></entry>
  </runtimeParameters>
</run>"#;

pub const USER_DOC: &str = r#"<user name="test">
  <parameters>
    <entry>
      <parameter name="General.ssh.public.key" category="General">
        <value>ssh-ed25519 AAAAC3Nza test@runagent</value>
      </parameter>
    </entry>
  </parameters>
</user>"#;

/// Run state serving `doc` through `states`.
pub fn run_state(doc: &str, states: &[&str]) -> RunState {
    RunState {
        states: states.iter().map(|s| s.to_string()).collect(),
        document: doc.to_string(),
        user: USER_DOC.to_string(),
        ..RunState::default()
    }
}
