use std::{borrow::Cow, error::Error, fmt::Display};

use serde::{Deserialize, Serialize};

pub const SCHEMA_PLACEHOLDER: &str = "{schema}";
pub const QUERY_PLACEHOLDER: &str = "{query}";

const SQLITE_TEMPLATE: &str = r#"
Sen bir SQL sorgu oluşturucususun. Veritabanı şeması ve kullanıcının Türkçe sorusu verildiğinde, SQLite uyumlu bir SQL sorgusu oluştur.
SADECE SQL ifadesini döndür, başka hiçbir şey yazma. Açıklama gerekmez.

VERİTABANI ŞEMASI:
{schema}

ÖNEMLİ NOTLAR:
1. Tablo isimlerini doğru yazmaya dikkat edin (büyük/küçük harf duyarlı olabilir).
2. Alan isimlerini tam olarak verildiği gibi kullanın.
3. Tablolar arası ilişkileri doğru kurun (foreign key'leri kullanın).
4. Sorgunun sonunda noktalı virgül (;) kullanmayın.
5. SQLite sözdizimine uygun yazın.
6. Sütun isimlerinde boşluk veya özel karakter varsa köşeli parantez içinde yazın (örneğin: [Unit Price]).

Kullanici sorusu: {query}

SQL Sorgusu:
"#;

const POSTGRES_TEMPLATE: &str = r#"
Sen bir PostgreSQL sorgu oluşturucususun. Veritabanı şeması ve kullanıcının Türkçe sorusu verildiğinde, PostgreSQL uyumlu bir SQL sorgusu oluştur.
SADECE SQL ifadesini döndür, başka hiçbir şey yazma. Açıklama gerekmez.

VERİTABANI ŞEMASI:
{schema}

ÖNEMLİ NOTLAR:
1. SQL anahtar kelimelerini büyük harfle yazın.
2. Tablo ve alan isimlerini şemada verildiği gibi kullanın; büyük harf içeren isimleri çift tırnak içinde yazın.
3. Tablolar arası ilişkileri doğru kurun (foreign key'leri kullanın).
4. Sorgunun sonunda noktalı virgül (;) kullanmayın.
5. PostgreSQL sözdizimine uygun yazın.
6. Sütun isimlerinde boşluk veya özel karakter varsa çift tırnak içinde yazın.

Kullanici sorusu: {query}

SQL Sorgusu:
"#;

const ORACLE_TEMPLATE: &str = r#"
Sen bir Oracle SQL sorgu oluşturucususun. Veritabanı şeması ve kullanıcının Türkçe sorusu verildiğinde, Oracle uyumlu bir SQL sorgusu oluştur.
SADECE SQL ifadesini döndür, başka hiçbir şey yazma. Açıklama gerekmez.

VERİTABANI ŞEMASI:
{schema}

ÖNEMLİ NOTLAR:
1. Tablo isimlerini büyük harfle yazın (Oracle case-sensitive'dir).
2. Alan isimlerini büyük harfle yazın.
3. Tablolar arası ilişkileri doğru kurun (foreign key'leri kullanın).
4. Sorgunun sonunda noktalı virgül (;) kullanmayın.
5. Oracle SQL sözdizimine uygun yazın.
6. Sütun isimlerinde özel karakter varsa çift tırnak içinde yazın.

Kullanici sorusu: {query}

SQL Sorgusu:
"#;

#[derive(Debug, Clone)]
pub enum TemplateError {
    MissingPlaceholder { placeholder: &'static str },
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::MissingPlaceholder { placeholder } => {
                write!(f, "Prompt template does not contain {placeholder}")
            }
        }
    }
}

impl Error for TemplateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Oracle,
}

impl Dialect {
    /// Dialect matching a backend name, if any.
    pub fn for_backend(name: &str) -> Option<Self> {
        match name {
            "sqlite" => Some(Dialect::Sqlite),
            "postgres" => Some(Dialect::Postgres),
            "oracle" => Some(Dialect::Oracle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: Cow<'static, str>,
}

impl PromptTemplate {
    pub fn for_dialect(dialect: Dialect) -> Self {
        let text = match dialect {
            Dialect::Sqlite => SQLITE_TEMPLATE,
            Dialect::Postgres => POSTGRES_TEMPLATE,
            Dialect::Oracle => ORACLE_TEMPLATE,
        };
        Self {
            text: Cow::Borrowed(text),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        for placeholder in [SCHEMA_PLACEHOLDER, QUERY_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(TemplateError::MissingPlaceholder { placeholder });
            }
        }
        Ok(Self {
            text: Cow::Owned(text),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitutes both placeholders in one left-to-right pass; inserted text
    /// is never scanned again.
    pub fn build(&self, schema: &str, query: &str) -> String {
        let mut prompt = String::with_capacity(self.text.len() + schema.len() + query.len());
        let mut rest: &str = &self.text;
        while let Some(start) = rest.find('{') {
            let tail = &rest[start..];
            let (replacement, consumed) = if tail.starts_with(SCHEMA_PLACEHOLDER) {
                (schema, SCHEMA_PLACEHOLDER.len())
            } else if tail.starts_with(QUERY_PLACEHOLDER) {
                (query, QUERY_PLACEHOLDER.len())
            } else {
                prompt.push_str(&rest[..=start]);
                rest = &rest[start + 1..];
                continue;
            };
            prompt.push_str(&rest[..start]);
            prompt.push_str(replacement);
            rest = &tail[consumed..];
        }
        prompt.push_str(rest);
        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_dialect(Dialect::Sqlite)
    }
}
