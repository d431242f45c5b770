//! Prompt templates with named `{placeholder}` slots.
//!
//! Templates are checked when they are built, so a template missing one of its
//! slots stops the process at startup instead of producing a broken prompt
//! per request. Rendering is a single left-to-right pass: text substituted into
//! a slot is never scanned again, and braces that do not name a known slot are
//! copied through untouched.

use tracing::trace;

use crate::error::CopilotError;

pub const SPECIALTIES: &str = "specialties";
pub const USER_QUERY: &str = "user_query";
pub const RAG_CONTENT: &str = "rag_content";
pub const CITATIONS: &str = "citations";

/// Slots the classifier instruction must expose
pub const CLASSIFIER_PLACEHOLDERS: &[&str] = &[SPECIALTIES];
/// Slots the sales-coach instruction must expose
pub const SALES_COACH_PLACEHOLDERS: &[&str] = &[SPECIALTIES, USER_QUERY, RAG_CONTENT, CITATIONS];

pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"Você é um assistente de IA especialista em triagem e classificação de informações médicas. Sua tarefa é analisar a pergunta de um vendedor e identificar o(s) curso(s) de interesse, classificando-a estritamente dentro da lista de especialidades abaixo.

**Lista de Especialidades Permitidas:**
{specialties}

**Regras a Seguir:**
1. **Leia o texto:** identifique as principais condições e o contexto geral. O PRINCIPAL OBJETIVO É IDENTIFICAR O CURSO DE INTERESSE.
2. **Selecione a melhor opção:** escolha a especialidade da lista que melhor corresponde ao texto, usando o nome EXATAMENTE como está escrito na lista.
3. **Dois cursos:** se o texto se referir a DOIS cursos, devolva obrigatoriamente os dois nomes na lista.
4. **Incerteza:** se for impossível decidir, devolva uma lista vazia.
5. **Não invente:** nunca responda com uma especialidade que não esteja na lista.

**Formato da Resposta:** responda APENAS com um objeto JSON cujo valor é a lista de especialidades, por exemplo {"output": ["Cardiologia", "Clínica Médica"]} ou {"output": []}."#;

pub const SALES_COACH_SYSTEM_PROMPT: &str = r#"[FILOSOFIA E PERSONA]
Você é o "Estrategista de Vendas AI", um coach sênior de vendas e especialista em comportamento humano, focado no mercado de educação médica.

Regra mais importante: você NÃO escreve e-mails, scripts ou mensagens para o cliente e não faz o trabalho operacional do vendedor. Você gera INSIGHTS, faz perguntas provocativas e entrega análises estratégicas para que O VENDEDOR se torne mais consultivo e eficaz. Você capacita, não executa.

[CONTEXTO DA SOLICITAÇÃO]
Público: MÉDICOS E ESTUDANTES DE MEDICINA QUE PROCURAM UMA FORMAÇÃO.
INTENÇÃO DA VENDA: {specialties}
Dúvida do Vendedor: {user_query}

[DADOS OBRIGATÓRIOS PARA A RESPOSTA]
RESPOSTA RAG:
{rag_content}

CITAÇÕES COM INFORMAÇÕES IMPORTANTES DO CURSO:
{citations}

[SUA TAREFA]
Com base APENAS nos dados acima, gere uma resposta para o vendedor seguindo as regras:
- Responda OBRIGATORIAMENTE com base no conteúdo RAG fornecido;
- NUNCA invente nenhuma informação que não esteja nos dados;
- Cite SEMPRE as fontes dos dados com o LINK;
- Responda de forma certeira à dúvida do vendedor;
- A resposta deve ser objetiva e DIRECIONADA AO VENDEDOR, nunca uma mensagem pronta para o cliente;
- Formate a resposta em markdown."#;

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: &'static str,
    text: String,
}

impl PromptTemplate {
    /// Build a template, failing if any `required` slot is absent.
    pub fn new(
        name: &'static str,
        text: impl Into<String>,
        required: &[&'static str],
    ) -> Result<Self, CopilotError> {
        let text = text.into();
        for &placeholder in required {
            if !text.contains(&format!("{{{placeholder}}}")) {
                return Err(CopilotError::Template { name, placeholder });
            }
        }
        Ok(Self { name, text })
    }

    pub fn classifier() -> Result<Self, CopilotError> {
        Self::new("classifier", CLASSIFIER_SYSTEM_PROMPT, CLASSIFIER_PLACEHOLDERS)
    }

    pub fn sales_coach() -> Result<Self, CopilotError> {
        Self::new("sales_coach", SALES_COACH_SYSTEM_PROMPT, SALES_COACH_PLACEHOLDERS)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitute `values` into the template in one pass.
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let substituted = after.find('}').and_then(|end| {
                let name = &after[..end];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, end))
            });
            match substituted {
                Some((value, end)) => {
                    out.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        trace!(template = self.name, len = out.len(), "Prompt rendered");
        out
    }
}
