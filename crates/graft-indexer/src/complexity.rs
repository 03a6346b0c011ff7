//! Nesting and parameter statistics for function definitions

use tree_sitter::Node;

use graft_core::{FunctionStats, NestingStats};

use crate::languages::LanguageRules;

/// Stats attached to a FUNCTION definition at extraction time.
pub fn function_stats(node: &Node<'_>, rules: &dyn LanguageRules) -> FunctionStats {
    FunctionStats {
        parameter_count: parameter_count(node),
        nesting: nesting_stats(node, rules),
    }
}

/// Number of declared parameters. Arrow-function declarators keep their
/// parameter list on the value node.
pub fn parameter_count(node: &Node<'_>) -> u32 {
    let parameters = node.child_by_field_name("parameters").or_else(|| {
        node.child_by_field_name("value")
            .and_then(|value| value.child_by_field_name("parameters"))
    });
    parameters.map(|p| p.named_child_count() as u32).unwrap_or(0)
}

/// Distribution of control-flow nesting depths across a definition's
/// immediate statements. Nested definitions are excluded; they carry
/// their own stats.
pub fn nesting_stats(node: &Node<'_>, rules: &dyn LanguageRules) -> NestingStats {
    let depths = nesting_levels(node, rules);
    if depths.is_empty() {
        return NestingStats::default();
    }

    let max = *depths.iter().max().expect("non-empty");
    let min = *depths.iter().min().expect("non-empty");
    let mean = depths.iter().map(|&d| d as f64).sum::<f64>() / depths.len() as f64;
    let sd = if depths.len() > 1 {
        let variance = depths
            .iter()
            .map(|&d| {
                let diff = d as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / (depths.len() - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    NestingStats {
        max_indentation: max,
        min_indentation: min,
        average_indentation: mean,
        sd,
    }
}

fn nesting_levels(node: &Node<'_>, rules: &dyn LanguageRules) -> Vec<u32> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !rules.is_definition_node(child))
        .map(|child| max_nesting_depth(&child, rules))
        .collect()
}

fn max_nesting_depth(node: &Node<'_>, rules: &dyn LanguageRules) -> u32 {
    let control_flow = rules.control_flow_types();
    let consequences = rules.consequence_types();

    let mut depths = Vec::new();
    let mut depth = 0u32;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if rules.is_definition_node(&child) {
            continue;
        }
        let kind = child.kind();
        if control_flow.contains(&kind) || consequences.contains(&kind) {
            depth += max_nesting_depth(&child, rules);
            if consequences.contains(&kind) {
                depth += 1;
            }
        }
        depths.push(depth);
        depth = 0;
    }
    depths.into_iter().max().unwrap_or(0)
}
