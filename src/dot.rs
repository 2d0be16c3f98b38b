//! Graphviz export of the Boolean graph, for debugging and documentation.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::pdag::{GateState, GateType, Pdag};

/// Write the graph in DOT format.
///
/// Gates are ellipses (double-bordered for modules), variables are boxes
/// labeled with their basic event, and complemented edges are dashed.
pub fn write_dot(graph: &Pdag, out: &mut impl Write) -> std::fmt::Result {
    writeln!(out, "digraph pdag {{")?;
    writeln!(out, "  rankdir=TB;")?;

    let mut variables: BTreeSet<u32> = BTreeSet::new();
    for gate in graph.gather_gates() {
        let entry = graph.gate(gate);
        let label = match entry.state() {
            GateState::Null => "0".to_string(),
            GateState::Unity => "1".to_string(),
            GateState::Normal => match entry.gate_type() {
                GateType::And => "and".to_string(),
                GateType::Or => "or".to_string(),
                GateType::Atleast => {
                    format!("atleast {}", entry.vote_number().unwrap_or(0))
                }
                GateType::Xor => "xor".to_string(),
                GateType::Not => "not".to_string(),
                GateType::Nand => "nand".to_string(),
                GateType::Nor => "nor".to_string(),
                GateType::Null => "null".to_string(),
            },
        };
        let peripheries = if entry.is_module() { ", peripheries=2" } else { "" };
        writeln!(out, "  G{} [label=\"G{}\\n{}\"{}];", gate, gate, label, peripheries)?;
        for &arg in entry.args() {
            let index = arg.unsigned_abs();
            let style = if arg < 0 { " [style=dashed]" } else { "" };
            if graph.is_variable(index) {
                variables.insert(index);
                writeln!(out, "  G{} -> x{}{};", gate, index, style)?;
            } else if graph.is_constant(index) {
                writeln!(out, "  G{} -> c{}{};", gate, index, style)?;
                writeln!(
                    out,
                    "  c{} [label=\"{}\", shape=plaintext];",
                    index,
                    if graph.constant_value(index) { "1" } else { "0" }
                )?;
            } else {
                writeln!(out, "  G{} -> G{}{};", gate, index, style)?;
            }
        }
    }
    for variable in variables {
        let event = &graph.events()[(variable - 1) as usize];
        writeln!(
            out,
            "  x{} [label=\"x{}: {}\", shape=box];",
            variable, variable, event.id
        )?;
    }
    writeln!(out, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formula, Model, Operand};

    #[test]
    fn test_dot_output() {
        let mut model = Model::new("top");
        model
            .add_basic_event("pump", 0.1)
            .add_basic_event("valve", 0.2)
            .add_gate(
                "top",
                Formula::and(vec![Operand::event("pump"), Operand::event("valve")]),
            );
        let graph = Pdag::from_model(&model, false).unwrap();
        let mut out = String::new();
        write_dot(&graph, &mut out).unwrap();
        assert!(out.starts_with("digraph pdag {"));
        assert!(out.contains("x1: pump"));
        assert!(out.contains("-> x2"));
        assert!(out.trim_end().ends_with('}'));
    }
}
