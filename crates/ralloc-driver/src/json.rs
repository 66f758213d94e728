//! JSON ingest/egress for the external module schema: `serde`-derived wire structs built
//! into `Function`/`Module` via `FunctionBuilder`, using this framework's name-based
//! identifier syntax (`v<n>`, `bb<n>`, optional `/<label>` suffix).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ralloc_ir::{builder::FunctionBuilder, BlockId, Function, Module, VarId};

use crate::error::DriverError;

#[derive(Debug, Serialize, Deserialize)]
struct FunctionDoc {
    name: String,
    entry_block: String,
    bblocks: Vec<BlockDoc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    allocations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockDoc {
    name: String,
    predecessors: Vec<String>,
    instructions: Vec<InstDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstDoc {
    opname: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    def: Option<String>,
    #[serde(rename = "use", default)]
    uses: Vec<OperandDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum OperandDoc {
    Plain(String),
    Phi { val: String, bb: String },
}

fn split_label(ident: &str) -> (&str, Option<&str>) {
    match ident.split_once('/') {
        Some((stem, label)) => (stem, Some(label)),
        None => (ident, None),
    }
}

/// Parse a module document (one JSON array of function objects) into the arena IR.
pub fn parse_module(contents: &str, file: &str) -> Result<Module, DriverError> {
    let docs: Vec<FunctionDoc> =
        serde_json::from_str(contents).map_err(|e| DriverError::Input { file: file.to_string(), detail: e.to_string() })?;

    let mut module = Module::new();
    for doc in docs {
        module.insert(parse_function(doc, file)?);
    }
    Ok(module)
}

fn parse_function(doc: FunctionDoc, file: &str) -> Result<Function, DriverError> {
    let mut builder = FunctionBuilder::new(doc.name.clone());

    let mut block_ids: BTreeMap<String, BlockId> = BTreeMap::new();
    for block_doc in &doc.bblocks {
        let (stem, _) = split_label(&block_doc.name);
        let id = builder.create_block();
        block_ids.insert(stem.to_string(), id);
    }

    let (entry_stem, _) = split_label(&doc.entry_block);
    let entry = *block_ids.get(entry_stem).ok_or_else(|| DriverError::Input {
        file: file.to_string(),
        detail: format!("{}: entry block {entry_stem} is not declared in bblocks", doc.name),
    })?;
    builder.set_entry(entry);

    for block_doc in &doc.bblocks {
        let (stem, _) = split_label(&block_doc.name);
        let &block_id = block_ids.get(stem).unwrap();
        for pred_name in &block_doc.predecessors {
            let (pred_stem, _) = split_label(pred_name);
            let &pred_id = block_ids.get(pred_stem).ok_or_else(|| DriverError::Input {
                file: file.to_string(),
                detail: format!("{}: unknown predecessor block {pred_stem}", doc.name),
            })?;
            builder.connect(pred_id, block_id);
        }
    }

    build_instructions(builder, &doc, &block_ids, file)
}

fn build_instructions(
    mut builder: FunctionBuilder,
    doc: &FunctionDoc,
    block_ids: &BTreeMap<String, BlockId>,
    file: &str,
) -> Result<Function, DriverError> {
    let mut var_ids: BTreeMap<String, VarId> = BTreeMap::new();

    for block_doc in &doc.bblocks {
        let (stem, _) = split_label(&block_doc.name);
        let block_id = block_ids[stem];

        for inst_doc in &block_doc.instructions {
            let def_var = inst_doc
                .def
                .as_deref()
                .map(|d| *var_ids.entry(split_label(d).0.to_string()).or_insert_with(|| builder.new_variable()));

            if inst_doc.opname.eq_ignore_ascii_case("phi") {
                let mut incoming = std::collections::BTreeMap::new();
                for operand in &inst_doc.uses {
                    let OperandDoc::Phi { val, bb } = operand else {
                        return Err(DriverError::Input {
                            file: file.to_string(),
                            detail: format!("{}: phi operand must carry a predecessor block", doc.name),
                        });
                    };
                    let (bb_stem, _) = split_label(bb);
                    let pred = *block_ids.get(bb_stem).ok_or_else(|| DriverError::Input {
                        file: file.to_string(),
                        detail: format!("{}: phi references unknown block {bb_stem}", doc.name),
                    })?;
                    let src = *var_ids.entry(split_label(val).0.to_string()).or_insert_with(|| builder.new_variable());
                    incoming.insert(pred, src);
                }
                let def = def_var.ok_or_else(|| DriverError::Input {
                    file: file.to_string(),
                    detail: format!("{}: phi instruction is missing a definition", doc.name),
                })?;
                builder.block_builder(block_id).phi(def, incoming);
            } else {
                let mut uses = Vec::with_capacity(inst_doc.uses.len());
                for operand in &inst_doc.uses {
                    let OperandDoc::Plain(name) = operand else {
                        return Err(DriverError::Input {
                            file: file.to_string(),
                            detail: format!("{}: non-phi instruction {} has a phi-shaped operand", doc.name, inst_doc.opname),
                        });
                    };
                    let v = *var_ids.entry(split_label(name).0.to_string()).or_insert_with(|| builder.new_variable());
                    uses.push(v);
                }
                builder.block_builder(block_id).op(inst_doc.opname.clone(), def_var, uses);
            }
        }
    }

    Ok(builder.finish())
}

/// Serialize `module` back to the external JSON schema, one document per function with
/// each variable's resulting allocation attached.
pub fn write_module(module: &Module) -> Result<String, DriverError> {
    let mut docs = Vec::new();
    for name in module.function_names() {
        let function = module.function(name).unwrap();
        docs.push(write_function(function));
    }
    serde_json::to_string_pretty(&docs).map_err(|e| DriverError::Input { file: "<output>".into(), detail: e.to_string() })
}

fn write_function(function: &Function) -> FunctionDoc {
    let mut bblocks = Vec::new();
    for block in &function.blocks {
        let predecessors = block.predecessors.iter().map(|b| b.to_string()).collect();
        let mut instructions = Vec::new();
        for inst in &block.insts {
            let opname = match &inst.opcode {
                ralloc_ir::Opcode::Phi => "phi".to_string(),
                ralloc_ir::Opcode::Load => "load".to_string(),
                ralloc_ir::Opcode::Store => "store".to_string(),
                ralloc_ir::Opcode::Mov => "mov".to_string(),
                ralloc_ir::Opcode::Branch => "branch".to_string(),
                ralloc_ir::Opcode::Op(s) => s.clone(),
            };
            let def = inst.def.map(|v| var_ident(function, v));
            let uses = match &inst.uses {
                ralloc_ir::Uses::List(vars) => vars.iter().map(|&v| OperandDoc::Plain(var_ident(function, v))).collect(),
                ralloc_ir::Uses::Phi(map) => {
                    map.iter().map(|(&bb, &v)| OperandDoc::Phi { val: var_ident(function, v), bb: bb.to_string() }).collect()
                }
            };
            instructions.push(InstDoc { opname, def, uses });
        }
        bblocks.push(BlockDoc { name: block.id.to_string(), predecessors, instructions });
    }

    let allocations = function.variables().map(|v| (var_ident(function, v.id), v.allocation.to_string())).collect();

    FunctionDoc { name: function.name.clone(), entry_block: function.entry.to_string(), bblocks, allocations: Some(allocations) }
}

fn var_ident(function: &Function, v: VarId) -> String {
    match &function.variable(v).label {
        Some(label) => format!("{v}/{label}"),
        None => v.to_string(),
    }
}
