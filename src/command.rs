//! Human-readable descriptions of document-database calls, shown as the
//! command text of a custom timing.
//!
//! Rendering is a pure function of the [`Operation`]: the first line is a
//! shell-style call naming only the parts that are present, followed by one
//! `name = <json>` line per present document.

use std::fmt::Write as _;

use serde_json::Value;

use crate::models::ExecuteType;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Find {
        collection: String,
        filter: Option<Value>,
        projection: Option<Value>,
        sort: Option<Value>,
        skip: u64,
        limit: u64,
    },
    Count {
        collection: String,
        filter: Option<Value>,
    },
    Distinct {
        collection: String,
        field: String,
        filter: Option<Value>,
    },
    Aggregate {
        collection: String,
        pipeline: Vec<Value>,
    },
    Insert {
        collection: String,
        documents: Vec<Value>,
    },
    Update {
        collection: String,
        filter: Option<Value>,
        update: Option<Value>,
        upsert: bool,
        multi: bool,
    },
    Replace {
        collection: String,
        filter: Option<Value>,
        replacement: Option<Value>,
        upsert: bool,
    },
    Delete {
        collection: String,
        filter: Option<Value>,
        just_one: bool,
    },
    FindAndModify {
        collection: String,
        filter: Option<Value>,
        sort: Option<Value>,
        update: Option<Value>,
        remove: bool,
        projection: Option<Value>,
        return_new: bool,
        upsert: bool,
    },
    BulkWrite {
        collection: String,
        requests: usize,
    },
    MapReduce {
        collection: String,
    },
    DatabaseCommand {
        database: String,
        command: String,
        args: Vec<String>,
    },
}

impl Operation {
    /// A plain `find` with no sort, projection or paging.
    pub fn find(collection: impl Into<String>, filter: Option<Value>) -> Self {
        Operation::Find {
            collection: collection.into(),
            filter,
            projection: None,
            sort: None,
            skip: 0,
            limit: 0,
        }
    }

    pub fn collection(&self) -> Option<&str> {
        match self {
            Operation::Find { collection, .. }
            | Operation::Count { collection, .. }
            | Operation::Distinct { collection, .. }
            | Operation::Aggregate { collection, .. }
            | Operation::Insert { collection, .. }
            | Operation::Update { collection, .. }
            | Operation::Replace { collection, .. }
            | Operation::Delete { collection, .. }
            | Operation::FindAndModify { collection, .. }
            | Operation::BulkWrite { collection, .. }
            | Operation::MapReduce { collection } => Some(collection),
            Operation::DatabaseCommand { .. } => None,
        }
    }

    pub fn execute_type(&self) -> ExecuteType {
        match self {
            Operation::Find { .. }
            | Operation::Count { .. }
            | Operation::Distinct { .. }
            | Operation::Aggregate { .. }
            | Operation::MapReduce { .. } => ExecuteType::Read,
            Operation::Insert { .. } | Operation::Delete { .. } | Operation::BulkWrite { .. } => {
                ExecuteType::Create
            }
            Operation::Update { .. }
            | Operation::Replace { .. }
            | Operation::FindAndModify { .. } => ExecuteType::Update,
            Operation::DatabaseCommand { .. } => ExecuteType::Command,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut docs: Vec<(&str, String)> = Vec::new();

        match self {
            Operation::Find {
                collection,
                filter,
                projection,
                sort,
                skip,
                limit,
            } => {
                let mut args = Vec::new();
                push_doc(&mut args, &mut docs, "query", filter);
                push_doc(&mut args, &mut docs, "fields", projection);
                let _ = write!(out, "db.{collection}.find({})", args.join(", "));
                if let Some(sort) = sort {
                    out.push_str(".sort(orderBy)");
                    docs.push(("orderBy", sort.to_string()));
                }
                if *skip != 0 {
                    let _ = write!(out, ".skip({skip})");
                }
                if *limit != 0 {
                    let _ = write!(out, ".limit({limit})");
                }
            }
            Operation::Count { collection, filter } => {
                let mut args = Vec::new();
                push_doc(&mut args, &mut docs, "query", filter);
                let _ = write!(out, "db.{collection}.count({})", args.join(", "));
            }
            Operation::Distinct {
                collection,
                field,
                filter,
            } => {
                let mut args = vec![Value::String(field.clone()).to_string()];
                push_doc(&mut args, &mut docs, "query", filter);
                let _ = write!(out, "db.{collection}.distinct({})", args.join(", "));
            }
            Operation::Aggregate {
                collection,
                pipeline,
            } => {
                let _ = write!(out, "db.{collection}.aggregate(pipeline)");
                docs.push(("pipeline", Value::Array(pipeline.clone()).to_string()));
            }
            Operation::Insert {
                collection,
                documents,
            } => match documents.as_slice() {
                [single] => {
                    let _ = write!(out, "db.{collection}.insert({single})");
                }
                many => {
                    let _ = write!(out, "db.{collection}.insert(<{} documents>)", many.len());
                }
            },
            Operation::Update {
                collection,
                filter,
                update,
                upsert,
                multi,
            } => {
                let mut args = Vec::new();
                push_doc(&mut args, &mut docs, "query", filter);
                push_doc(&mut args, &mut docs, "update", update);
                push_options(&mut args, &[("upsert", *upsert), ("multi", *multi)]);
                let _ = write!(out, "db.{collection}.update({})", args.join(", "));
            }
            Operation::Replace {
                collection,
                filter,
                replacement,
                upsert,
            } => {
                let mut args = Vec::new();
                push_doc(&mut args, &mut docs, "query", filter);
                push_doc(&mut args, &mut docs, "replacement", replacement);
                push_options(&mut args, &[("upsert", *upsert)]);
                let _ = write!(out, "db.{collection}.replaceOne({})", args.join(", "));
            }
            Operation::Delete {
                collection,
                filter,
                just_one,
            } => {
                let mut args = Vec::new();
                push_doc(&mut args, &mut docs, "query", filter);
                if *just_one {
                    if args.is_empty() {
                        args.push("{}".to_string());
                    }
                    args.push("true".to_string());
                }
                let _ = write!(out, "db.{collection}.remove({})", args.join(", "));
            }
            Operation::FindAndModify {
                collection,
                filter,
                sort,
                update,
                remove,
                projection,
                return_new,
                upsert,
            } => {
                let mut args = Vec::new();
                push_doc(&mut args, &mut docs, "query", filter);
                push_doc(&mut args, &mut docs, "sort", sort);
                if *remove {
                    args.push("remove".to_string());
                    docs.push(("remove", "true".to_string()));
                } else {
                    push_doc(&mut args, &mut docs, "update", update);
                }
                push_doc(&mut args, &mut docs, "fields", projection);
                push_options(&mut args, &[("new", *return_new), ("upsert", *upsert)]);
                let _ = write!(out, "db.{collection}.findAndModify({})", args.join(", "));
            }
            Operation::BulkWrite {
                collection,
                requests,
            } => {
                let _ = write!(out, "db.{collection}.bulkWrite(<{requests} requests>)");
            }
            Operation::MapReduce { collection } => {
                let _ = write!(
                    out,
                    "db.{collection}.mapReduce(<map function>, <reduce function>, options)"
                );
            }
            Operation::DatabaseCommand {
                database,
                command,
                args,
            } => {
                let _ = write!(out, "{database}.{command}({})", args.join(", "));
            }
        }

        for (name, json) in docs {
            let _ = write!(out, "\n{name} = {json}");
        }
        out
    }
}

fn push_doc<'a>(
    args: &mut Vec<String>,
    docs: &mut Vec<(&'a str, String)>,
    name: &'a str,
    value: &Option<Value>,
) {
    if let Some(value) = value {
        args.push(name.to_string());
        docs.push((name, value.to_string()));
    }
}

fn push_options(args: &mut Vec<String>, flags: &[(&str, bool)]) {
    let set: Vec<String> = flags
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| format!("{name}: true"))
        .collect();
    if !set.is_empty() {
        args.push(format!("{{ {} }}", set.join(", ")));
    }
}
