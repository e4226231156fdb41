//! Owned snapshot of the run representation served as `application/xml`.
//!
//! The document is parsed once with `roxmltree` and copied into plain maps so
//! it can be cached and shared between the lifecycle and the coordinator
//! without keeping the XML text alive.

use std::collections::BTreeMap;

use roxmltree::Node;

use super::keys;
use super::node::NodeInstance;
use crate::error::{AgentError, Result};

/// Module category of an image run.
pub const CATEGORY_IMAGE: &str = "Image";
/// Module category of a deployment run.
pub const CATEGORY_DEPLOYMENT: &str = "Deployment";

/// Named script body of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Target {
    pub script: String,
    pub run_in_background: bool,
}

/// Recipes used when the run builds an image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildTargets {
    pub prerecipe: String,
    pub recipe: String,
    pub packages: Vec<String>,
}

/// Targets of a node image, depending on the module category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTargets {
    Deployment(BTreeMap<String, Target>),
    Build(BuildTargets),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeImage {
    pub attributes: BTreeMap<String, String>,
    pub targets: BTreeMap<String, Target>,
    pub build: BuildTargets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeParameter {
    pub key: String,
    pub group: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunDocument {
    pub node_names: Vec<String>,
    pub category: String,
    pub run_type: String,
    pub mutable: bool,
    pub cloud_service_name: String,
    pub module_category: String,
    /// Image of the module itself, present for image runs.
    pub module_image: Option<NodeImage>,
    /// Images of deployment nodes, by node name.
    pub node_images: BTreeMap<String, NodeImage>,
    pub parameters: BTreeMap<String, Option<String>>,
    pub runtime_parameters: Vec<RuntimeParameter>,
}

impl RunDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| AgentError::Document(format!("run document: {e}")))?;
        let root = doc.root_element();

        let node_names = root
            .attribute("nodeNames")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();

        let module = child(root, "module");
        let module_category = module
            .and_then(|m| m.attribute("category"))
            .unwrap_or_default()
            .to_string();

        let module_image = match module {
            Some(m) if module_category == CATEGORY_IMAGE => Some(parse_image(m)),
            _ => None,
        };

        let mut node_images = BTreeMap::new();
        if let Some(m) = module {
            for node in descend(m, &["nodes", "entry", "node"]) {
                if let (Some(name), Some(image)) = (node.attribute("name"), child(node, "image")) {
                    node_images.insert(name.to_string(), parse_image(image));
                }
            }
        }

        let mut parameters = BTreeMap::new();
        for param in descend(root, &["parameters", "entry", "parameter"]) {
            if let Some(name) = param.attribute("name") {
                let value = child(param, "value").map(|v| v.text().unwrap_or_default().to_string());
                parameters.insert(name.to_string(), value);
            }
        }

        let runtime_parameters = descend(root, &["runtimeParameters", "entry", "runtimeParameter"])
            .into_iter()
            .map(|rtp| RuntimeParameter {
                key: rtp.attribute("key").unwrap_or_default().to_string(),
                group: rtp.attribute("group").unwrap_or_default().to_string(),
                value: rtp.text().unwrap_or_default().to_string(),
            })
            .collect();

        Ok(Self {
            node_names,
            category: root.attribute("category").unwrap_or_default().to_string(),
            run_type: root.attribute("type").unwrap_or_default().to_string(),
            mutable: root
                .attribute("mutable")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            cloud_service_name: root.attribute("cloudServiceName").unwrap_or_default().to_string(),
            module_category,
            module_image,
            node_images,
            parameters,
            runtime_parameters,
        })
    }

    /// Image backing `node_name`; the module itself for image runs.
    pub fn node_image(&self, node_name: &str) -> Option<&NodeImage> {
        if self.module_category == CATEGORY_IMAGE {
            self.module_image.as_ref()
        } else {
            self.node_images.get(node_name)
        }
    }

    /// Deployment targets of `node_name`, empty when the node is unknown.
    pub fn targets(&self, node_name: &str) -> BTreeMap<String, Target> {
        self.node_image(node_name)
            .map(|image| image.targets.clone())
            .unwrap_or_default()
    }

    /// Targets of a node image according to the module category.
    pub fn image_targets(&self, node_name: &str) -> Result<ImageTargets> {
        let image = self.node_image(node_name).cloned().unwrap_or_default();
        match self.module_category.as_str() {
            CATEGORY_IMAGE => Ok(ImageTargets::Build(image.build)),
            CATEGORY_DEPLOYMENT => Ok(ImageTargets::Deployment(image.targets)),
            other => Err(AgentError::Client {
                status: 0,
                message: format!(
                    "Unknown category: '{other}'. Possible values: [{CATEGORY_IMAGE}, {CATEGORY_DEPLOYMENT}]"
                ),
            }),
        }
    }

    /// Runtime parameters of every node instance, keyed by instance name.
    ///
    /// Property names drop the `<instance>:` prefix. With `cloud_filter`
    /// set, only instances running on that cloud service are kept.
    pub fn node_instance_parameters(
        &self,
        cloud_filter: Option<&str>,
    ) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut instances = BTreeMap::new();
        for name in &self.node_names {
            let mut params = BTreeMap::new();
            params.insert(keys::NODE_INSTANCE_NAME_KEY.to_string(), name.clone());
            for rtp in self.runtime_parameters.iter().filter(|p| &p.group == name) {
                let key = rtp
                    .key
                    .split_once(keys::PROPERTY_SEPARATOR)
                    .map(|(_, k)| k)
                    .unwrap_or(&rtp.key);
                params.insert(key.to_string(), rtp.value.clone());
            }
            instances.insert(name.clone(), params);
        }

        if let Some(cloud) = cloud_filter {
            instances.retain(|_, params| {
                params.get(keys::CLOUDSERVICE_KEY).map(String::as_str) == Some(cloud)
            });
        }
        instances
    }

    /// Node instances with their image attributes and targets attached.
    pub fn node_instances(&self, cloud_filter: Option<&str>) -> Result<BTreeMap<String, NodeInstance>> {
        let mut out = BTreeMap::new();
        for (name, params) in self.node_instance_parameters(cloud_filter) {
            let mut instance = NodeInstance::new(params);
            let node_name = instance.node_name().to_string();
            if let Some(image) = self.node_image(&node_name) {
                instance.set_image_attributes(image.attributes.clone());
            }
            if !instance.is_orchestrator() {
                instance.set_image_targets(self.image_targets(&node_name)?);
            }
            out.insert(name, instance);
        }
        Ok(out)
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

/// Elements reached by following `path` from `node`, like `a/b/c` in XPath.
fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Vec<Node<'a, 'input>> {
    let mut current = vec![node];
    for segment in path {
        current = current
            .into_iter()
            .flat_map(|n| n.children())
            .filter(|c| c.is_element() && c.tag_name().name() == *segment)
            .collect();
    }
    current
}

fn parse_image(image: Node<'_, '_>) -> NodeImage {
    let attributes = image
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();

    let targets = descend(image, &["targets", "target"])
        .into_iter()
        .filter_map(|t| {
            let name = t.attribute("name")?;
            let run_in_background = t
                .attribute("runInBackground")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            Some((
                name.to_string(),
                Target {
                    script: t.text().unwrap_or_default().to_string(),
                    run_in_background,
                },
            ))
        })
        .collect();

    let text_of = |name: &str| {
        child(image, name)
            .and_then(|n| n.text())
            .unwrap_or_default()
            .to_string()
    };
    let build = BuildTargets {
        prerecipe: text_of("prerecipe"),
        recipe: text_of("recipe"),
        packages: descend(image, &["packages", "package"])
            .into_iter()
            .filter_map(|p| p.attribute("name"))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect(),
    };

    NodeImage {
        attributes,
        targets,
        build,
    }
}
