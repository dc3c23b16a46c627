//! Builds the scoped input set a node executes against.

use std::collections::HashMap;

use cascade_core::NodeId;
use cascade_execution::{ExecutionState, VariableSet};
use cascade_workflow::{CollisionStrategy, DependencyGraph, NodeDefinition, WorkflowDefinition};
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::executor::NodeExecutionInputs;

/// Assembles [`NodeExecutionInputs`] for one node from its parents' outputs,
/// its edges' additional sources, and its explicit mappings.
///
/// Each node gets an immutable snapshot: it cannot reach back into sibling
/// state except through declared additional sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableBinder;

impl VariableBinder {
    /// Create a binder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Bind inputs for `node` against the current execution state.
    pub fn bind(
        &self,
        workflow: &WorkflowDefinition,
        graph: &DependencyGraph,
        state: &ExecutionState,
        node: &NodeDefinition,
    ) -> Result<NodeExecutionInputs, EngineError> {
        // 1. Parent outputs by reverse adjacency. Parents without recorded
        //    output (failed, skipped, inactive) are simply absent.
        let parents = graph.predecessors(node.id);
        let mut parent_outputs: HashMap<NodeId, Map<String, Value>> = HashMap::new();
        for &parent in &parents {
            if let Some(output) = state.node_output(parent) {
                parent_outputs.insert(parent, output.clone());
            }
        }

        // 2. Additional sources from incoming edges, excluding direct parents.
        let mut additional: Vec<(String, Map<String, Value>)> = Vec::new();
        for edge in graph.incoming_edges(node.id) {
            for name in edge.include_outputs_from() {
                let source = workflow
                    .node_by_name(name)
                    .ok_or_else(|| EngineError::NotFound(format!("additional source '{name}'")))?;
                if parents.contains(&source.id)
                    || additional.iter().any(|(n, _)| n == name)
                {
                    continue;
                }
                if let Some(output) = state.node_output(source.id) {
                    additional.push((name.to_string(), output.clone()));
                }
            }
        }

        // 3. Auto-bind parent outputs under the configured collision strategy.
        let binding = &node.input_binding;
        let mut scoped = VariableSet::new();
        if binding.auto_bind {
            match binding.collision_strategy {
                CollisionStrategy::NamespaceByParent => {
                    for &parent in &parents {
                        let Some(output) = parent_outputs.get(&parent) else {
                            continue;
                        };
                        let name = parent_name(workflow, parent)?;
                        scoped.set(name, Value::Object(output.clone()))?;
                    }
                }
                CollisionStrategy::Collect => {
                    let mut collected: Vec<(String, Vec<Value>)> = Vec::new();
                    for &parent in &parents {
                        let Some(output) = parent_outputs.get(&parent) else {
                            continue;
                        };
                        for (key, value) in output {
                            match collected.iter_mut().find(|(k, _)| k == key) {
                                Some((_, values)) => values.push(value.clone()),
                                None => collected.push((key.clone(), vec![value.clone()])),
                            }
                        }
                    }
                    for (key, mut values) in collected {
                        let value = if values.len() == 1 {
                            values.remove(0)
                        } else {
                            Value::Array(values)
                        };
                        scoped.set(key, value)?;
                    }
                }
                CollisionStrategy::Error => {
                    let mut seen: HashMap<&str, NodeId> = HashMap::new();
                    for &parent in &parents {
                        let Some(output) = parent_outputs.get(&parent) else {
                            continue;
                        };
                        for key in output.keys() {
                            if let Some(&other) = seen.get(key.as_str()) {
                                return Err(EngineError::Validation(format!(
                                    "input key '{key}' provided by both {other} and {parent}"
                                )));
                            }
                            seen.insert(key, parent);
                        }
                    }
                    for &parent in &parents {
                        let Some(output) = parent_outputs.get(&parent) else {
                            continue;
                        };
                        for (key, value) in output {
                            scoped.set(key.clone(), value.clone())?;
                        }
                    }
                }
            }
        }

        // 4. Explicit mappings override whatever auto-bind produced.
        for (target, source_path) in &binding.mappings {
            let value = resolve_mapping(workflow, &parent_outputs, source_path)
                .ok_or_else(|| {
                    EngineError::Validation(format!(
                        "mapping '{target}' references unresolvable source '{source_path}'"
                    ))
                })?;
            scoped.set(target.clone(), value)?;
        }

        // 5. Additional sources are namespaced by node name regardless of
        //    the auto-bind setting.
        for (name, output) in additional {
            scoped.set(name, Value::Object(output))?;
        }

        // 6. Input schema: required variables must be present.
        if let Some(schema) = &node.io_schema {
            for required in schema.required_inputs() {
                if !scoped.contains(required) {
                    return Err(EngineError::Validation(format!(
                        "node '{}' requires input '{required}' which is not bound",
                        node.name
                    )));
                }
            }
        }

        Ok(NodeExecutionInputs {
            variables: scoped,
            global_context: state.globals.clone(),
            parent_outputs,
            execution_id: state.execution_id,
            workflow_id: state.workflow_id,
        })
    }
}

fn parent_name(workflow: &WorkflowDefinition, parent: NodeId) -> Result<String, EngineError> {
    workflow
        .node(parent)
        .map(|n| n.name.clone())
        .ok_or_else(|| EngineError::NotFound(format!("parent node {parent}")))
}

/// Resolve a mapping source: `parent_name.field` first, then a bare `field`
/// searched across all parents' outputs (first match in parent order wins).
fn resolve_mapping(
    workflow: &WorkflowDefinition,
    parent_outputs: &HashMap<NodeId, Map<String, Value>>,
    source_path: &str,
) -> Option<Value> {
    if let Some((parent_name, field)) = source_path.split_once('.') {
        let parent = workflow.node_by_name(parent_name)?;
        return parent_outputs.get(&parent.id)?.get(field).cloned();
    }
    workflow.nodes.iter().find_map(|candidate| {
        parent_outputs
            .get(&candidate.id)
            .and_then(|output| output.get(source_path))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{ExecutionId, TriggerId};
    use cascade_workflow::{EdgeDefinition, InputBinding, IoSchema, NodeType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    struct Fixture {
        workflow: WorkflowDefinition,
        graph: DependencyGraph,
        state: ExecutionState,
        target: NodeId,
    }

    /// fetch ─┐
    ///        ├─> merge        (plus `seed` reachable via include_outputs_from)
    /// parse ─┘
    fn fixture(binding: InputBinding) -> Fixture {
        let seed = NodeId::v4();
        let fetch = NodeId::v4();
        let parse = NodeId::v4();
        let merge = NodeId::v4();

        let workflow = WorkflowDefinition::new("bind-test")
            .with_nodes(vec![
                NodeDefinition::new(seed, "seed", NodeType::Start),
                NodeDefinition::new(fetch, "fetch", NodeType::Http),
                NodeDefinition::new(parse, "parse", NodeType::Transform),
                NodeDefinition::new(merge, "merge", NodeType::DataMerger)
                    .with_input_binding(binding),
            ])
            .with_edges(vec![
                EdgeDefinition::direct(seed, fetch),
                EdgeDefinition::direct(seed, parse),
                EdgeDefinition::direct(fetch, merge),
                EdgeDefinition::direct(parse, merge).with_include_outputs_from(&["seed"]),
            ]);
        let graph = workflow.build_graph().unwrap();

        let mut state = ExecutionState::new(ExecutionId::v4(), workflow.id);
        state
            .record_started(
                TriggerId::v4(),
                vec![seed, fetch, parse, merge],
                obj(&[("env", json!("test"))]),
            )
            .unwrap();
        for (id, name, output) in [
            (seed, "seed", obj(&[("run", json!(7))])),
            (fetch, "fetch", obj(&[("body", json!("payload")), ("status", json!(200))])),
            (parse, "parse", obj(&[("status", json!("parsed")), ("count", json!(3))])),
        ] {
            state.record_node_started(id, name, 1, Map::new()).unwrap();
            state.record_node_completed(id, name, output, None).unwrap();
        }

        Fixture {
            workflow,
            graph,
            state,
            target: merge,
        }
    }

    fn bind(fixture: &Fixture) -> Result<NodeExecutionInputs, EngineError> {
        let node = fixture.workflow.node(fixture.target).unwrap();
        VariableBinder::new().bind(&fixture.workflow, &fixture.graph, &fixture.state, node)
    }

    #[test]
    fn namespace_by_parent_never_collides() {
        let fixture = fixture(InputBinding::default());
        let inputs = bind(&fixture).unwrap();

        // Each parent's full output map sits under the parent's name.
        assert_eq!(
            inputs.variables.get("fetch").unwrap()["status"],
            json!(200)
        );
        assert_eq!(
            inputs.variables.get("parse").unwrap()["status"],
            json!("parsed")
        );
        // No top-level key leaks out of the namespaces.
        assert!(inputs.variables.get("status").is_none());
    }

    #[test]
    fn collect_gathers_colliding_keys() {
        let fixture = fixture(InputBinding {
            collision_strategy: CollisionStrategy::Collect,
            ..InputBinding::default()
        });
        let inputs = bind(&fixture).unwrap();

        // "status" appears in both parents: collected into a list.
        assert_eq!(
            inputs.variables.get("status"),
            Some(&json!([200, "parsed"]))
        );
        // Singleton keys are unwrapped.
        assert_eq!(inputs.variables.get("body"), Some(&json!("payload")));
        assert_eq!(inputs.variables.get("count"), Some(&json!(3)));
    }

    #[test]
    fn error_strategy_rejects_collisions() {
        let fixture = fixture(InputBinding {
            collision_strategy: CollisionStrategy::Error,
            ..InputBinding::default()
        });
        let err = bind(&fixture).unwrap_err();
        assert!(err.to_string().contains("'status'"));
    }

    #[test]
    fn explicit_mappings_override_auto_bind() {
        let mut mappings = indexmap::IndexMap::new();
        mappings.insert("payload".to_string(), "fetch.body".to_string());
        mappings.insert("n".to_string(), "count".to_string());
        let fixture = fixture(InputBinding {
            mappings,
            ..InputBinding::default()
        });
        let inputs = bind(&fixture).unwrap();

        assert_eq!(inputs.variables.get("payload"), Some(&json!("payload")));
        // Bare field found by searching parents.
        assert_eq!(inputs.variables.get("n"), Some(&json!(3)));
    }

    #[test]
    fn unresolvable_mapping_fails_validation() {
        let mut mappings = indexmap::IndexMap::new();
        mappings.insert("x".to_string(), "fetch.missing_field".to_string());
        let fixture = fixture(InputBinding {
            mappings,
            ..InputBinding::default()
        });
        let err = bind(&fixture).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn additional_sources_are_namespaced_even_without_auto_bind() {
        let fixture = fixture(InputBinding {
            auto_bind: false,
            ..InputBinding::default()
        });
        let inputs = bind(&fixture).unwrap();

        // No parent bindings...
        assert!(inputs.variables.get("fetch").is_none());
        // ...but the declared additional source is there, namespaced.
        assert_eq!(inputs.variables.get("seed").unwrap()["run"], json!(7));
    }

    #[test]
    fn parent_outputs_and_globals_are_exposed() {
        let fixture = fixture(InputBinding::default());
        let inputs = bind(&fixture).unwrap();

        assert_eq!(inputs.parent_outputs.len(), 2);
        assert!(inputs.global_context.is_read_only());
        assert_eq!(inputs.global_context.get("env"), Some(&json!("test")));
        assert_eq!(inputs.execution_id, fixture.state.execution_id);
    }

    #[test]
    fn required_input_schema_enforced() {
        let fixture = {
            let mut fixture = fixture(InputBinding::default());
            let schema: IoSchema = serde_json::from_value(json!({
                "inputs": {"ghost": {"required": true}}
            }))
            .unwrap();
            let node = fixture
                .workflow
                .nodes
                .iter_mut()
                .find(|n| n.id == fixture.target)
                .unwrap();
            node.io_schema = Some(schema);
            fixture
        };
        let err = bind(&fixture).unwrap_err();
        assert!(err.to_string().contains("requires input 'ghost'"));
    }

    #[test]
    fn missing_parent_output_is_simply_absent() {
        // Re-run the fixture but without completing `parse`.
        let fixture = {
            let mut raw = fixture(InputBinding::default());
            // Rebuild state with only seed + fetch completed.
            let mut state = ExecutionState::new(ExecutionId::v4(), raw.workflow.id);
            let ids: Vec<NodeId> = raw.workflow.nodes.iter().map(|n| n.id).collect();
            state
                .record_started(TriggerId::v4(), ids, Map::new())
                .unwrap();
            let fetch = raw.workflow.node_by_name("fetch").unwrap().id;
            state.record_node_started(fetch, "fetch", 1, Map::new()).unwrap();
            state
                .record_node_completed(fetch, "fetch", obj(&[("body", json!("b"))]), None)
                .unwrap();
            raw.state = state;
            raw
        };
        let inputs = bind(&fixture).unwrap();
        assert!(inputs.variables.get("fetch").is_some());
        assert!(inputs.variables.get("parse").is_none());
        assert_eq!(inputs.parent_outputs.len(), 1);
    }
}
