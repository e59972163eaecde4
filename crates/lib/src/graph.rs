//! Ordering and consistency checks across the outputs of one recipe.
//!
//! Only conda outputs take part in ordering; other output types keep their
//! declaration order and go last. Cycle detection is pairwise: two outputs
//! that each depend on the other are reported, longer cycles are not.

use indexmap::IndexMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::error::{RenderError, Result};
use crate::render::RenderedOutput;

/// First token of a requirement spec.
fn spec_name(spec: &str) -> &str {
  spec.split_whitespace().next().unwrap_or_default()
}

/// Whether `spec` refers to the package `name`.
fn depends_on(spec: &str, name: &str) -> bool {
  spec == name || spec.strip_prefix(name).is_some_and(|rest| rest.starts_with(' '))
}

/// Run-requirement graph between the conda outputs of a recipe. Edges
/// point from a dependency to its dependent.
pub struct OutputGraph {
  graph: DiGraph<String, ()>,
  nodes: IndexMap<String, NodeIndex>,
}

impl OutputGraph {
  pub fn from_outputs(outputs: &[RenderedOutput]) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes = IndexMap::new();

    for out in outputs.iter().filter(|o| o.descriptor.is_conda()) {
      let name = out.descriptor.name().to_string();
      if !nodes.contains_key(&name) {
        let idx = graph.add_node(name.clone());
        nodes.insert(name, idx);
      }
    }

    for out in outputs.iter().filter(|o| o.descriptor.is_conda()) {
      let dependent = nodes[out.descriptor.name()];
      for dep in &out.metadata.document().requirements.run {
        if let Some(&dependency) = nodes.get(spec_name(dep))
          && dependency != dependent
          && graph.find_edge(dependency, dependent).is_none()
        {
          graph.add_edge(dependency, dependent, ());
        }
      }
    }

    Self { graph, nodes }
  }

  /// Output names with dependencies first. Among outputs that are ready at
  /// the same time the earlier declared one comes first. Names caught in a
  /// cycle are appended in declaration order.
  pub fn order(&self) -> Vec<String> {
    let mut in_degree: Vec<usize> = self
      .nodes
      .values()
      .map(|&idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
      .collect();
    let mut placed = vec![false; self.nodes.len()];
    let mut order = Vec::with_capacity(self.nodes.len());

    while let Some(pos) = (0..self.nodes.len()).find(|&i| !placed[i] && in_degree[i] == 0) {
      placed[pos] = true;
      let Some((name, &idx)) = self.nodes.get_index(pos) else {
        break;
      };
      order.push(name.clone());
      for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        if let Some(dep_pos) = self.nodes.get_index_of(&self.graph[dependent]) {
          in_degree[dep_pos] = in_degree[dep_pos].saturating_sub(1);
        }
      }
    }

    let leftover: Vec<String> = self
      .nodes
      .keys()
      .enumerate()
      .filter(|(i, _)| !placed[*i])
      .map(|(_, name)| name.clone())
      .collect();
    if !leftover.is_empty() {
      warn!(outputs = ?leftover, "dependency cycle among outputs; keeping declaration order");
      order.extend(leftover);
    }
    order
  }
}

/// Reorder outputs so that run dependencies come first. Non-conda outputs
/// follow in their original order.
pub fn toposort(outputs: Vec<RenderedOutput>) -> Vec<RenderedOutput> {
  let order = OutputGraph::from_outputs(&outputs).order();
  debug!(order = ?order, "output order");

  let (conda, other): (Vec<_>, Vec<_>) = outputs.into_iter().partition(|o| o.descriptor.is_conda());
  let mut by_name: IndexMap<String, Vec<RenderedOutput>> = IndexMap::new();
  for out in conda {
    by_name.entry(out.descriptor.name().to_string()).or_default().push(out);
  }

  let mut sorted = Vec::new();
  for name in order {
    if let Some(group) = by_name.shift_remove(&name) {
      sorted.extend(group);
    }
  }
  sorted.extend(other);
  sorted
}

/// Fail when two outputs each list the other among their build, host or
/// run requirements.
pub fn check_circular_dependencies(outputs: &[RenderedOutput]) -> Result<()> {
  let mut pairs: Vec<(String, String)> = Vec::new();
  for (i, a) in outputs.iter().enumerate() {
    for b in &outputs[i + 1..] {
      let (a_name, b_name) = (a.metadata.raw_name(), b.metadata.raw_name());
      if a_name == b_name {
        continue;
      }
      let a_deps = &a.metadata.document().requirements;
      let b_deps = &b.metadata.document().requirements;
      if b_deps.build_host_run().any(|d| depends_on(d, a_name)) && a_deps.build_host_run().any(|d| depends_on(d, b_name)) {
        let pair = (a_name.to_string(), b_name.to_string());
        if !pairs.contains(&pair) {
          pairs.push(pair);
        }
      }
    }
  }

  if pairs.is_empty() {
    Ok(())
  } else {
    Err(RenderError::CircularDependency { pairs })
  }
}

/// Fail when an exact `name version build` requirement on a sibling output
/// names a build other than the sibling's build id. Requirements and run
/// exports are checked between outputs rendered for agreeing variants.
pub fn ensure_matching_hashes(outputs: &[RenderedOutput]) -> Result<()> {
  let mut pairs: Vec<(String, String)> = Vec::new();

  for (i, producer) in outputs.iter().enumerate() {
    let name = producer.metadata.name()?;
    let build_id = producer.metadata.build_id()?;
    let prefix = format!("{} ", name);

    for (j, consumer) in outputs.iter().enumerate() {
      if i == j || !producer.metadata.variant().agrees_with(consumer.metadata.variant()) {
        continue;
      }
      let doc = consumer.metadata.document();
      let run_exports = doc.build.run_exports.as_ref().map(|r| r.all()).unwrap_or_default();
      let mismatched = doc
        .requirements
        .build_host_run()
        .chain(run_exports)
        .filter(|dep| dep.starts_with(&prefix))
        .any(|dep| {
          let parts: Vec<&str> = dep.split(' ').collect();
          parts.len() == 3 && parts[2] != build_id
        });
      if mismatched {
        let pair = (name.clone(), consumer.metadata.raw_name().to_string());
        if !pairs.contains(&pair) {
          warn!(producer = %pair.0, consumer = %pair.1, "exact pin does not match build id");
          pairs.push(pair);
        }
      }
    }
  }

  if pairs.is_empty() {
    Ok(())
  } else {
    Err(RenderError::HashMismatch { pairs })
  }
}
