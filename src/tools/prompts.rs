//! Static help prompts.

use crate::tools::registry::Prompt;

const PROMPTS: &[(&str, &str, &str)] = &[
    (
        "db/multi_database_help",
        "Overview of working with several databases",
        "This server manages a catalog of SQLite databases, each known by a unique name.\n\
         \n\
         1. Register a database file with db/register_database.\n\
         2. Check what is available with db/list_databases or the db/databases resource.\n\
         3. Pass the registered name as database_name to any other tool.\n\
         \n\
         Connections open on first use and stay open until shutdown. Every database \
         allows one connection at a time, so statements against the same name run one \
         after another while different names run side by side.",
    ),
    (
        "db/register_help",
        "How to register a database",
        "db/register_database takes:\n\
         - name: unique logical name\n\
         - path: absolute path of the SQLite file\n\
         - owner: who is responsible for it\n\
         - description (optional)\n\
         - readonly (optional, default false)\n\
         \n\
         Relative paths are rejected. A writable database file is created when it is \
         first opened; a readonly one must already exist. Registering a name twice fails.",
    ),
    (
        "db/query_help",
        "How to run read-only queries",
        "db/query runs a single SELECT, WITH or EXPLAIN statement.\n\
         \n\
         Arguments: database_name, query, and optionally args for ? placeholders.\n\
         Example: {\"database_name\": \"sales\", \"query\": \"SELECT * FROM orders WHERE total > ?\", \"args\": [100]}\n\
         \n\
         The result holds columns and rows. Statements that change data are refused; \
         use db/insert_record, db/bulk_insert or db/execute_batch for writes.",
    ),
    (
        "db/schema_help",
        "How to inspect database structure",
        "- db/get_tables lists the tables of a database.\n\
         - db/get_table_schema describes one table: columns with type, nullability, \
         default and primary key flag, plus its indexes.\n\
         - db/get_schema returns every table's CREATE statement with its named indexes.\n\
         \n\
         All three take database_name; db/get_table_schema also takes table_name.",
    ),
    (
        "db/insert_help",
        "How to insert rows",
        "db/insert_record inserts one row. data maps column names to values:\n\
         {\"database_name\": \"sales\", \"table_name\": \"orders\", \"data\": {\"customer\": \"acme\", \"total\": 250}}\n\
         \n\
         The response carries the new row id and rows_affected. Table and column names \
         must be plain identifiers (letters, digits, underscore). For many rows at once \
         use db/bulk_insert.",
    ),
    (
        "db/batch_help",
        "How to run batches and bulk inserts",
        "db/execute_batch runs a list of {database, query, args} operations concurrently. \
         Each runs in its own transaction; one failure does not roll back the others. \
         Results come back in the order submitted, with succeeded and failed counts.\n\
         \n\
         db/bulk_insert writes many rows to one table in a single transaction:\n\
         {\"database\": \"sales\", \"table\": \"orders\", \"columns\": [\"customer\", \"total\"], \
         \"values\": [[\"acme\", 250], [\"globex\", 90]]}\n\
         An optional on_conflict clause such as \"ON CONFLICT DO NOTHING\" is appended to \
         the insert. If any row fails, none are written.",
    ),
];

/// Every built-in help prompt.
pub fn prompts() -> Vec<Prompt> {
    PROMPTS
        .iter()
        .map(|(name, description, content)| Prompt {
            name: (*name).to_string(),
            description: (*description).to_string(),
            content: (*content).to_string(),
        })
        .collect()
}
